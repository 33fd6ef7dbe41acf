use std::{env, fs, path::PathBuf, process};

use encoder_replay::{action_label, load_config, parse_expected, parse_trace, replay};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let mut trace_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut expect_path: Option<PathBuf> = None;

    let mut idx = 1usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                idx += 1;
                let Some(path) = args.get(idx) else {
                    return Err("missing path after --config".into());
                };
                config_path = Some(PathBuf::from(path));
            }
            "--expect" => {
                idx += 1;
                let Some(path) = args.get(idx) else {
                    return Err("missing path after --expect".into());
                };
                expect_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            value if value.starts_with('-') => {
                return Err(format!("unknown argument: {value}"));
            }
            value => {
                if trace_path.is_some() {
                    return Err("multiple trace paths provided".into());
                }
                trace_path = Some(PathBuf::from(value));
            }
        }
        idx += 1;
    }

    let trace_path = trace_path.ok_or_else(usage)?;
    let config_path = config_path.ok_or_else(usage)?;
    let (name, config) = load_config(&config_path).map_err(|e| e.to_string())?;
    let trace = parse_trace(&trace_path).map_err(|e| e.to_string())?;
    let output = replay(&name, config, &trace);

    println!("action,ms,kind,usage,position,layer");
    for action in &output.actions {
        let label = action_label(action);
        let (kind, usage) = label.split_once(' ').unwrap_or((label.as_str(), ""));
        println!(
            "action,{},{},{},{},{}",
            action.event.timestamp.as_millis(),
            kind,
            usage,
            action.event.position,
            action.event.layer
        );
    }
    for skipped in &output.skipped {
        println!("skip,{},{}", skipped.ms, skipped.reason.label());
    }

    if let Some(expect_path) = expect_path {
        let text = fs::read_to_string(&expect_path)
            .map_err(|e| format!("failed to open {}: {e}", expect_path.display()))?;
        let expected = parse_expected(&text);
        let actual = output.labels();
        if actual != expected {
            eprintln!("expected actions: {}", expected.join(","));
            eprintln!("actual actions:   {}", actual.join(","));
            return Err("action sequence mismatch".into());
        }
    }

    Ok(())
}

fn usage() -> String {
    "usage: encoder_replay <trace.csv> --config <translator.toml> [--expect expected_actions.txt]"
        .to_string()
}
