use crate::omdb::DEFAULT_OMDB_URL;
use std::env;
use std::io;
use std::path::PathBuf;

pub struct Config {
    pub bind: String,
    pub data_file: PathBuf,
    pub templates: String,
    pub omdb_url: String,
    pub omdb_api_key: String,
}

impl Config {
    /// Reads the process environment. Call `dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> io::Result<Self> {
        let omdb_api_key = env::var("OMDB_API_KEY").map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "OMDB_API_KEY must be set")
        })?;
        Ok(Config {
            bind: env::var("MOVIEWEB_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_owned()),
            data_file: env::var("MOVIEWEB_DATA")
                .unwrap_or_else(|_| "movies.json".to_owned())
                .into(),
            templates: env::var("MOVIEWEB_TEMPLATES").unwrap_or_else(|_| {
                concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*").to_owned()
            }),
            omdb_url: env::var("OMDB_URL").unwrap_or_else(|_| DEFAULT_OMDB_URL.to_owned()),
            omdb_api_key,
        })
    }
}
