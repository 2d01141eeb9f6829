use anyhow::{bail, Context, Result};
use spinny_link::{init_logging, LinkConfig, Orchestrator, RtcPeerFactory, WsConnector};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SESSION_START_TIMEOUT: Duration = Duration::from_secs(10);
const USAGE: &str = "Usage: link-probe [--config <file>] [--url <ws-url>] [--steps <n>]... [--frames <n>] [--out <dir>] [--json]";

struct Args {
    config: Option<PathBuf>,
    url: Option<String>,
    steps: Vec<i16>,
    frames: u32,
    out: PathBuf,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        config: None,
        url: None,
        steps: Vec::new(),
        frames: 1,
        out: PathBuf::from("."),
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        let value = |i: usize| args.get(i + 1).with_context(|| format!("{} needs a value", args[i]));
        match args[i].as_str() {
            "--config" => {
                parsed.config = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--url" => {
                parsed.url = Some(value(i)?.clone());
                i += 1;
            }
            "--steps" => {
                parsed.steps.push(value(i)?.parse().context("--steps expects a signed 16-bit integer")?);
                i += 1;
            }
            "--frames" => {
                parsed.frames = value(i)?.parse().context("--frames expects a count")?;
                i += 1;
            }
            "--out" => {
                parsed.out = PathBuf::from(value(i)?);
                i += 1;
            }
            "--json" => parsed.json = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}\n{}", other, USAGE),
        }
        i += 1;
    }

    if parsed.steps.is_empty() {
        parsed.steps = vec![30, -30];
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = env::args().collect();
    let args = parse_args(&args)?;

    let mut config = match &args.config {
        Some(path) => LinkConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LinkConfig::load_or_default(),
    };
    if let Some(url) = &args.url {
        config.signaling.url = url.clone();
    }
    let (obs_width, obs_height) = (config.video.observation_width, config.video.observation_height);

    let mut link = Orchestrator::new(config, WsConnector, Arc::new(RtcPeerFactory));
    let handle = link.handle();
    let runner = tokio::spawn(async move { link.run().await });

    let probe = async {
        handle
            .wait_for_session(SESSION_START_TIMEOUT)
            .await
            .context("Link session never started")?;
        handle.wait_for_connection().await.context("Link never connected")?;
        println!("Connected");

        let controls = handle.controls();
        let mut frames = handle.frames();
        let mut shot = 0u32;
        for steps in &args.steps {
            controls.send_command(*steps).await.context("Failed to send step command")?;
            tokio::time::sleep(controls.actuation_delay(*steps)).await;

            for _ in 0..args.frames {
                let frame = frames.get_next_frame().await.context("Failed to read a frame")?;
                let path = args.out.join(format!("obs-{:03}.jpg", shot));
                frame
                    .resized(obs_width, obs_height)
                    .save(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if args.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "steps": steps,
                            "sequence": frame.sequence,
                            "width": frame.width(),
                            "height": frame.height(),
                            "received_at": frame.received_at,
                            "path": path,
                        })
                    );
                } else {
                    println!(
                        "steps {:>4}: frame {} {}x{} -> {}",
                        steps,
                        frame.sequence,
                        frame.width(),
                        frame.height(),
                        path.display()
                    );
                }
                shot += 1;
            }
        }

        if args.json {
            println!("{}", serde_json::to_string(&handle.stats())?);
        } else {
            println!("{:?}", handle.stats());
        }
        anyhow::Ok(())
    };

    let outcome = tokio::select! {
        result = probe => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted");
            Ok(())
        }
    };

    handle.close();
    match runner.await.context("Link task panicked")? {
        Ok(exit) => log::info!("Link finished: {:?}", exit),
        Err(e) => log::warn!("Link finished with error: {}", e),
    }
    outcome
}
