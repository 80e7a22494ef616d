//! ---
//! c2_section: "05-networking-external-interfaces"
//! c2_subsection: "binary"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Interactive operator console for the ground control station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::io::Write;

use anyhow::{Context, Result};
use r_c2_common::config::StationConfig;
use r_c2_core::CommandDispatcher;
use r_c2_rt::RateLimiter;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::{parse_duration, parse_scan_type, render_events, render_liveness, render_report, scan};

const MAIN_PROMPT: &str = "Enter 'h' for a heartbeat check, a scan duration in seconds, or 'q' to quit: ";
const SCAN_TYPE_PROMPT: &str = "Scan type (1 = Radar, 2 = LiDAR, 3 = Sonar): ";

#[derive(Debug, PartialEq)]
enum Input {
    Heartbeat,
    Scan(String),
    Quit,
    Empty,
}

fn classify(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "h" | "H" => Input::Heartbeat,
        "q" | "Q" => Input::Quit,
        other => Input::Scan(other.to_owned()),
    }
}

/// Read-eval loop; returns when the operator quits or stdin closes.
pub async fn run(
    dispatcher: &mut CommandDispatcher,
    station: &StationConfig,
    json: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut limiter = RateLimiter::new(station.heartbeat_interval);

    loop {
        let Some(line) = prompt(MAIN_PROMPT, &mut lines, dispatcher, &mut limiter, json).await? else {
            break;
        };
        match classify(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Heartbeat => {
                let late = dispatcher.pump().await;
                render_events(&late, json)?;
                render_liveness(dispatcher, station);
            }
            Input::Scan(raw) => {
                let duration = match parse_duration(&raw) {
                    Ok(duration) => duration,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                let Some(raw_type) =
                    prompt(SCAN_TYPE_PROMPT, &mut lines, dispatcher, &mut limiter, json).await?
                else {
                    break;
                };
                let scan_type = match parse_scan_type(&raw_type) {
                    Ok(scan_type) => scan_type,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                let report = scan(dispatcher, station, duration, scan_type).await?;
                render_report(&report, json)?;
            }
        }
    }
    info!("operator console closed");
    Ok(())
}

/// Print `text` and wait for a line, beaconing and draining the link while the operator types.
async fn prompt(
    text: &str,
    lines: &mut Lines<BufReader<Stdin>>,
    dispatcher: &mut CommandDispatcher,
    limiter: &mut RateLimiter,
    json: bool,
) -> Result<Option<String>> {
    print!("{text}");
    std::io::stdout().flush().context("failed to flush stdout")?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context("failed to read operator input")?;
                if line.is_none() {
                    debug!("stdin closed");
                }
                return Ok(line);
            }
            _ = limiter.tick() => {
                dispatcher.beacon_if_due().await;
                let late = dispatcher.pump().await;
                render_events(&late, json)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_operator_input() {
        assert_eq!(classify(" h "), Input::Heartbeat);
        assert_eq!(classify("Q"), Input::Quit);
        assert_eq!(classify(""), Input::Empty);
        assert_eq!(classify("5"), Input::Scan("5".to_owned()));
    }
}
