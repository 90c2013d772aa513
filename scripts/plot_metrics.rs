use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

/// Print ASCII charts of the channels a training run recorded.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Plot directory of a run (`<out_dir>/<name>`)
    dir: PathBuf,

    /// Width of the longest bar
    #[arg(long, default_value_t = 50)]
    width: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let channels: Vec<Vec<String>> = serde_json::from_str(
        &fs::read_to_string(args.dir.join("channels.json")).context("reading channels.json")?,
    )?;
    let file = File::open(args.dir.join("metrics.jsonl")).context("opening metrics.jsonl")?;
    let mut rows = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: Value = serde_json::from_str(&line)?;
        rows.push(rec);
    }
    if rows.is_empty() {
        log::warn!("no records in {}", args.dir.display());
        return Ok(());
    }

    for group in &channels {
        for channel in group {
            let series: Vec<(u64, f64)> = rows
                .iter()
                .filter_map(|r| Some((r["epoch"].as_u64()?, r[channel.as_str()].as_f64()?)))
                .collect();
            if series.is_empty() {
                continue;
            }
            let max = series.iter().fold(f64::MIN, |a, &(_, v)| a.max(v));
            println!("{channel}");
            for (epoch, v) in &series {
                let bar = if max > 0.0 {
                    ((v / max) * args.width as f64).max(0.0) as usize
                } else {
                    0
                };
                println!("{:5} | {} {:.4}", epoch, "*".repeat(bar), v);
            }
        }
        println!();
    }
    Ok(())
}
