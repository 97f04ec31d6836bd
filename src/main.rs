use std::{path::PathBuf, process::ExitCode, time::Duration};

use raylua_bridge_lib::{scripting::sandbox::TrustLevel, BindingConfig, ScriptHost};

const USAGE: &str = "usage: raylua <script.lua> [--config <file.json>] [--trust basic|file_read|elevated]";

struct CliArgs {
    script: PathBuf,
    config: Option<PathBuf>,
    trust: Option<TrustLevel>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut script = None;
    let mut config = None;
    let mut trust = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            "--trust" => {
                let level = iter.next().ok_or("--trust needs a level")?;
                trust = Some(TrustLevel::parse(level).ok_or_else(|| format!("unknown trust level '{level}'"))?);
            }
            other if other.starts_with("--") => return Err(format!("unknown option '{other}'")),
            other if script.is_none() => script = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    let script = script.ok_or("no script given")?;
    Ok(CliArgs { script, config, trust })
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let mut config = match &cli.config {
        Some(path) => match BindingConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(2);
            }
        },
        None => BindingConfig::default(),
    };
    if let Some(trust) = cli.trust {
        config.trust = trust;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str())).init();

    let host = match ScriptHost::new(&config) {
        Ok(host) => host,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match host.run_file(&cli.script) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if !result.success {
        if let Some(error) = &result.error {
            eprintln!("{error}");
        }
        return ExitCode::FAILURE;
    }

    // Let attached processors and queued sounds finish.
    host.wait_for_audio(Duration::from_secs(config.audio.linger_secs));
    ExitCode::SUCCESS
}
