mod settings;

pub use settings::{
    Config, ConfigError, EmbedderConfig, GenerationConfig, RetrievalConfig, VectorStoreConfig,
    show_config,
};
