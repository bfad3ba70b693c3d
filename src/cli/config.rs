use rewind::config::Config;
use rewind::core::path::config_file;
use rewind::{RewindError, RewindResult};

pub fn show() -> RewindResult<()> {
    let config = Config::load()?;
    let content = serde_yaml::to_string(&config)
        .map_err(|e| RewindError::Config(format!("Failed to serialize config: {}", e)))?;
    print!("{}", content);
    Ok(())
}

pub fn path() -> RewindResult<()> {
    println!("{}", config_file()?.display());
    Ok(())
}
