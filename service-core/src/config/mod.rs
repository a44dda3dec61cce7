use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Load `T` from an optional config file (any format the `config` crate
/// recognises by extension) overlaid with `<PREFIX>__SECTION__KEY`
/// environment variables. `.env` is read first when present.
///
/// Environment values arrive as strings. Declare numeric fields directly on
/// `T`; a `#[serde(flatten)]` section would see them through
/// `deserialize_any` and reject the string.
pub fn load_layered<T: DeserializeOwned>(file: &str, env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(Environment::with_prefix(env_prefix).separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
