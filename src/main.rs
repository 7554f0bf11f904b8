use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process;

use dispatch_bench::config::Config;
use dispatch_bench::pipeline::controller::Pipeline;
use dispatch_bench::utils::ts_hm;
use dispatch_bench::DynError;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), DynError> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        return Err(format!("usage: {} <config.json> <results_dir>", args[0]).into());
    }

    let config_path = Path::new(&args[1]);
    let results_dir = Path::new(&args[2]);

    fs::create_dir_all(results_dir)
        .map_err(|e| format!("cannot create results dir {}: {}", results_dir.display(), e))?;

    let scenario = config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("run")
        .to_string();

    let cfg = Config::load(config_path)?;

    let log_path = results_dir.join(format!("{scenario}_log.txt"));
    let summary_path = results_dir.join(format!("{scenario}_summary.txt"));
    let mut log_file = File::create(&log_path)
        .map_err(|e| format!("cannot create log file {}: {}", log_path.display(), e))?;

    eprintln!(
        "[{}] [PIPELINE] Running scenario: {} ({} producers, {} processors, {} strategies, {}s)",
        ts_hm(),
        scenario,
        cfg.producers.count,
        cfg.processors.count,
        cfg.strategies.count,
        cfg.duration_secs,
    );

    let pipeline = Pipeline::new(&cfg)?;
    let report = pipeline.run(|stats| {
        let line = stats.format_line();
        println!("{line}");
        if let Err(e) = writeln!(log_file, "{line}") {
            eprintln!("[MONITOR] Warning: failed to write log line: {}", e);
        }
    });

    let summary = report.format_summary(&scenario);
    fs::write(&summary_path, &summary)
        .map_err(|e| format!("cannot write summary {}: {}", summary_path.display(), e))?;
    print!("{summary}");

    eprintln!(
        "[{}] [SHUTDOWN] Scenario {} complete. Results written to {}",
        ts_hm(),
        scenario,
        summary_path.display(),
    );

    Ok(())
}
