use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::error;

use hippso_core::cli::{Cli, Command};
use hippso_core::config::Config;
use hippso_core::engine::Engine;
use hippso_core::error::{EngineError, EngineResult};
use hippso_core::strategy::function::Sphere;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        error!("{err}");
        eprintln!("hippso {VERSION}: fatal error: {err}");
        eprintln!("please report this along with the configuration and backup files involved");
        std::process::exit(1);
    }
}

fn run(command: Command) -> EngineResult<()> {
    match command {
        Command::C { config } => start(&config),
        Command::R { confbu } => resume(&confbu, true),
        Command::Rf { confbu } => resume(&confbu, false),
        Command::Restart { config, backup } => restart(&config, &backup),
        Command::RestartAll { dir } => restart_all(&dir),
        Command::Version => {
            println!("hippso {VERSION}");
            Ok(())
        }
        Command::Bignumversion => {
            println!("rug/GMP+MPFR (see Cargo.lock for exact versions)");
            Ok(())
        }
    }
}

fn prefix_of(path: &Path) -> PathBuf {
    path.with_extension("")
}

fn append_log(prefix: &Path, line: &str) -> EngineResult<()> {
    let log_path = prefix.with_extension("log");
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| EngineError::io(log_path.display().to_string(), e))?;
    let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    writeln!(file, "{timestamp} {line}").map_err(|e| EngineError::io(log_path.display().to_string(), e))
}

fn start(config_path: &Path) -> EngineResult<()> {
    let config = Config::load(config_path)?;
    let prefix = prefix_of(config_path);
    let confbu_path = prefix.with_extension("confBU");
    std::fs::copy(config_path, &confbu_path).map_err(|e| EngineError::io(confbu_path.display().to_string(), e))?;
    append_log(&prefix, "start")?;

    let mut engine = Engine::initialize(&config, prefix.clone(), Box::new(Sphere))?;
    engine.run_to_completion()?;
    append_log(&prefix, "complete")
}

fn resume(confbu_path: &Path, require_sentinel: bool) -> EngineResult<()> {
    let prefix = prefix_of(confbu_path);
    let shutdown_sentinel = prefix.with_extension("SHUTDOWN");
    if require_sentinel && !shutdown_sentinel.exists() {
        return Err(EngineError::invariant(format!(
            "{} is missing; use rf to force-resume without it",
            shutdown_sentinel.display()
        )));
    }
    let config = Config::load(confbu_path)?;
    let backup_path = prefix.with_extension("backup");
    let mut engine = Engine::restore(&config, prefix.clone(), Box::new(Sphere), &backup_path)?;
    if shutdown_sentinel.exists() {
        std::fs::remove_file(&shutdown_sentinel).map_err(|e| EngineError::io(shutdown_sentinel.display().to_string(), e))?;
    }
    append_log(&prefix, "resume")?;
    engine.run_to_completion()?;
    append_log(&prefix, "complete")
}

fn restart(config_path: &Path, backup_path: &Path) -> EngineResult<()> {
    let prefix = prefix_of(backup_path);
    let new_config = Config::load(config_path)?;
    let original_confbu = prefix.with_extension("confBU");
    if original_confbu.exists() {
        let original_config = Config::load(&original_confbu)?;
        if !new_config.trajectory_compatible_with(&original_config) {
            return Err(EngineError::configuration(
                "restart configuration changes swarm sizing, topology shape, or RNG seed, which would alter the trajectory",
            ));
        }
    }
    let confbu_path = prefix.with_extension("confBU");
    std::fs::copy(config_path, &confbu_path).map_err(|e| EngineError::io(confbu_path.display().to_string(), e))?;
    let mut engine = Engine::restore(&new_config, prefix.clone(), Box::new(Sphere), backup_path)?;
    append_log(&prefix, "restart")?;
    engine.run_to_completion()?;
    append_log(&prefix, "complete")
}

fn restart_all(dir: &Path) -> EngineResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::io(dir.display().to_string(), e))?;
    let exe = std::env::current_exe().map_err(|e| EngineError::io("<current executable>", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir.display().to_string(), e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("confBU") {
            continue;
        }
        let prefix = prefix_of(&path);
        if !prefix.with_extension("SHUTDOWN").exists() {
            continue;
        }
        std::process::Command::new(&exe)
            .arg("r")
            .arg(&path)
            .spawn()
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;
    }
    Ok(())
}
