use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use gatelink::export::parse_export;
use gatelink::payload::{decode_payload, SensorSchema};
use gatelink::range::{resolve_day_range, GateMeta};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatelink", about = "Decode and plan queries against gate telemetry exports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header, footer and integrity status of an export buffer
    Inspect {
        input: PathBuf,
    },
    /// Decode the records of an export buffer
    Decode {
        input: PathBuf,
        /// Sensor schema JSON; when given, payloads are decoded into fields
        #[arg(short, long)]
        schema: Option<PathBuf>,
        /// Emit records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Compute the record-id window for a calendar day
    Range {
        /// Day to resolve, YYYY-MM-DD (local time)
        date: NaiveDate,
        /// Gate metadata JSON: {"head_id", "oldest_id", "interval_ms"}
        #[arg(short, long)]
        meta: PathBuf,
        /// Override "now" in Unix milliseconds (defaults to the wall clock)
        #[arg(long)]
        now_ms: Option<i64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input } => {
            let buf = std::fs::read(&input)?;
            let export = parse_export(&buf)?;
            println!("── gate export ─────────────────────────────────────────");
            println!("  Path          {}", input.display());
            println!("  Version       {}", export.header.version);
            println!("  Record size   {} B", export.header.record_size);
            println!("  Records       {}", export.count());
            println!("  Footer count  {}{}", export.footer.count,
                     if export.integrity.count_ok { "" } else { "  (MISMATCH)" });
            println!("  Last id       {}", export.footer.last_id);
            println!("  CRC32         0x{:08x}{}", export.footer.crc32,
                     if export.integrity.crc_ok {
                         "  (ok)".to_string()
                     } else {
                         format!("  (MISMATCH, computed 0x{:08x})", export.integrity.computed_crc32)
                     });
        }

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { input, schema, json } => {
            let buf = std::fs::read(&input)?;
            let export = parse_export(&buf)?;
            let schema: Option<SensorSchema> = match schema {
                Some(path) => Some(serde_json::from_slice(&std::fs::read(path)?)?),
                None => None,
            };

            if json {
                let rows: Vec<serde_json::Value> = export
                    .records
                    .iter()
                    .map(|rec| {
                        let mut row = serde_json::to_value(rec).unwrap_or_default();
                        if let (Some(s), Some(obj)) = (&schema, row.as_object_mut()) {
                            let fields = decode_payload(&rec.payload, s);
                            obj.insert("fields".into(), serde_json::to_value(fields).unwrap_or_default());
                        }
                        row
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:<10} {:<17} {:>6} {:>5}  Timestamp / fields",
                         "Id", "MAC", "RSSI", "Type");
                for rec in &export.records {
                    print!("{:<10} {:<17} {:>6} {:>5}  {}",
                           rec.record_id, rec.mac_str(), rec.rssi,
                           rec.sensor_type_id, rec.timestamp_ms);
                    if let Some(s) = &schema {
                        for (key, value) in decode_payload(&rec.payload, s) {
                            print!("  {key}={value}");
                        }
                    }
                    println!();
                }
                if !export.is_intact() {
                    eprintln!("warning: integrity check failed (CRC or count mismatch)");
                }
            }
        }

        // ── Range ────────────────────────────────────────────────────────────
        Commands::Range { date, meta, now_ms } => {
            let meta: GateMeta = serde_json::from_slice(&std::fs::read(meta)?)?;
            let now_ms = now_ms.unwrap_or_else(|| Local::now().timestamp_millis());
            let range = resolve_day_range(date, &Local, &meta, now_ms)?;
            if range.is_empty() {
                println!("{date}: no records (empty range at id {})", range.since_id);
            } else {
                println!("{date}: since_id={} until_id={} ({} ids)",
                         range.since_id, range.until_id, range.len());
            }
        }
    }

    Ok(())
}
