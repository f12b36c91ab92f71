//! Typed settings resolved from the `settings` table of [`ConfigDb`].

use std::{fmt::Display, str::FromStr};

use crate::{
    chunk_store::DistanceMetric,
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config_db::ConfigDb,
    error::{Error, Result},
    fulltext::{PreviewOptions, DEFAULT_PREVIEW_LENGTH, DEFAULT_PREVIEW_LIMIT},
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
    semantic::DEFAULT_OVERSAMPLE,
};

pub const CHUNK_SIZE: &str = "chunk_size";
pub const CHUNK_OVERLAP: &str = "chunk_overlap";
pub const OVERSAMPLE: &str = "oversample";
pub const PREVIEW_LENGTH: &str = "preview_length";
pub const PREVIEW_LIMIT: &str = "preview_limit";
pub const DISTANCE: &str = "distance";
pub const MODEL: &str = "model";

/// Every key accepted by `config set`.
pub const KEYS: &[&str] = &[
    CHUNK_SIZE,
    CHUNK_OVERLAP,
    OVERSAMPLE,
    PREVIEW_LENGTH,
    PREVIEW_LIMIT,
    DISTANCE,
    MODEL,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub oversample: usize,
    pub preview: PreviewOptions,
    pub distance: DistanceMetric,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            oversample: DEFAULT_OVERSAMPLE,
            preview: PreviewOptions::default(),
            distance: DistanceMetric::default(),
            model: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `config_db`, filling in defaults for missing keys.
    ///
    /// The model id comes from `PAPERSIFT_MODEL` when set, then the stored
    /// `model` setting, then the default model.
    pub fn resolve(config_db: &ConfigDb) -> Result<Self> {
        let chunking = ChunkingConfig::new(
            get(config_db, CHUNK_SIZE, DEFAULT_CHUNK_SIZE)?,
            get(config_db, CHUNK_OVERLAP, DEFAULT_CHUNK_OVERLAP)?,
        )?;

        let oversample = get(config_db, OVERSAMPLE, DEFAULT_OVERSAMPLE)?;
        if oversample == 0 {
            return Err(Error::Config(format!("{OVERSAMPLE} must be at least 1")));
        }

        let model = match std::env::var(MODEL_ENV_VAR) {
            Ok(model) => model,
            Err(_) => config_db
                .get_setting(MODEL)?
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
        };

        Ok(Self {
            chunking,
            oversample,
            preview: PreviewOptions {
                length: get(config_db, PREVIEW_LENGTH, DEFAULT_PREVIEW_LENGTH)?,
                limit: get(config_db, PREVIEW_LIMIT, DEFAULT_PREVIEW_LIMIT)?,
            },
            distance: get(config_db, DISTANCE, DistanceMetric::default())?,
            model,
        })
    }

    /// Resolved value of every key, in [`KEYS`] order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (CHUNK_SIZE, self.chunking.chunk_size.to_string()),
            (CHUNK_OVERLAP, self.chunking.overlap.to_string()),
            (OVERSAMPLE, self.oversample.to_string()),
            (PREVIEW_LENGTH, self.preview.length.to_string()),
            (PREVIEW_LIMIT, self.preview.limit.to_string()),
            (DISTANCE, self.distance.to_string()),
            (MODEL, self.model.clone()),
        ]
    }

    /// Check that `value` is acceptable for `key` before it is stored.
    pub fn validate(key: &str, value: &str) -> Result<()> {
        match key {
            CHUNK_SIZE | CHUNK_OVERLAP | OVERSAMPLE | PREVIEW_LENGTH
            | PREVIEW_LIMIT => parse::<usize>(key, value).map(drop),
            DISTANCE => parse::<DistanceMetric>(key, value).map(drop),
            MODEL if value.trim().is_empty() => {
                Err(Error::Config(format!("{MODEL} must not be empty")))
            }
            MODEL => Ok(()),
            _ => Err(Error::NotFound {
                kind: "setting",
                name: key.to_string(),
            }),
        }
    }
}

fn get<T>(config_db: &ConfigDb, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match config_db.get_setting(key)? {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e| {
        Error::Config(format!("invalid value {value:?} for {key}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn defaults_when_nothing_is_stored() {
        let (_tmp, db) = test_db();
        let settings = Settings::resolve(&db).unwrap();
        assert_eq!(settings.chunking.chunk_size, 1024);
        assert_eq!(settings.chunking.overlap, 100);
        assert_eq!(settings.oversample, 2);
        assert_eq!(settings.preview, PreviewOptions { length: 50, limit: 5 });
        assert_eq!(settings.distance, DistanceMetric::SquaredEuclidean);
    }

    #[test]
    fn stored_values_override_defaults() {
        let (_tmp, db) = test_db();
        db.set_setting(CHUNK_SIZE, "256").unwrap();
        db.set_setting(CHUNK_OVERLAP, "32").unwrap();
        db.set_setting(OVERSAMPLE, "3").unwrap();
        db.set_setting(PREVIEW_LIMIT, "1").unwrap();
        db.set_setting(DISTANCE, "cosine").unwrap();

        let settings = Settings::resolve(&db).unwrap();
        assert_eq!(settings.chunking, ChunkingConfig::new(256, 32).unwrap());
        assert_eq!(settings.oversample, 3);
        assert_eq!(settings.preview.limit, 1);
        assert_eq!(settings.preview.length, 50);
        assert_eq!(settings.distance, DistanceMetric::Cosine);
    }

    #[test]
    fn invalid_stored_value_names_the_key() {
        let (_tmp, db) = test_db();
        db.set_setting(PREVIEW_LENGTH, "lots").unwrap();
        let err = Settings::resolve(&db).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains(PREVIEW_LENGTH)));
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let (_tmp, db) = test_db();
        db.set_setting(CHUNK_SIZE, "10").unwrap();
        db.set_setting(CHUNK_OVERLAP, "10").unwrap();
        assert!(matches!(Settings::resolve(&db), Err(Error::Config(_))));
    }

    #[test]
    fn zero_oversample_is_rejected() {
        let (_tmp, db) = test_db();
        db.set_setting(OVERSAMPLE, "0").unwrap();
        assert!(matches!(Settings::resolve(&db), Err(Error::Config(_))));
    }

    #[test]
    fn entries_cover_every_key() {
        let keys: Vec<&str> =
            Settings::default().entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, KEYS);
    }

    #[test]
    fn validate_checks_keys_and_values() {
        assert!(Settings::validate(CHUNK_SIZE, "512").is_ok());
        assert!(Settings::validate(DISTANCE, "l2").is_ok());
        assert!(Settings::validate(DISTANCE, "manhattan").is_err());
        assert!(Settings::validate(OVERSAMPLE, "-1").is_err());
        assert!(Settings::validate(MODEL, " ").is_err());
        assert!(matches!(
            Settings::validate("colour", "blue"),
            Err(Error::NotFound { kind: "setting", .. })
        ));
    }
}
