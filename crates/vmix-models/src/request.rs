//! Media request payload and its validation rules.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Maximum accepted length of a task name.
pub const MAX_TASK_NAME_LEN: usize = 128;

pub type RequestResult<T> = Result<T, RequestError>;

/// Reasons a media request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid task name: {0}")]
    InvalidTaskName(String),

    #[error("At least one video block is required")]
    NoVideoBlocks,

    #[error("At least one audio block is required")]
    NoAudioBlocks,

    #[error("At least one text-to-speech item is required")]
    NoSpeech,

    #[error("Block '{0}' has no entries")]
    EmptyBlock(String),

    #[error("Invalid URL in block '{block}': {url}")]
    InvalidUrl { block: String, url: String },

    #[error("Text-to-speech item {0} has empty text or voice")]
    InvalidSpeech(usize),

    #[error("Combination count {total} exceeds maximum {max}")]
    CombinationLimitExceeded { total: u64, max: u64 },
}

impl RequestError {
    pub fn invalid_task_name(msg: impl Into<String>) -> Self {
        Self::InvalidTaskName(msg.into())
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::InvalidTaskName(_) => "invalid_task_name",
            RequestError::NoVideoBlocks => "no_video_blocks",
            RequestError::NoAudioBlocks => "no_audio_blocks",
            RequestError::NoSpeech => "no_speech",
            RequestError::EmptyBlock(_) => "empty_block",
            RequestError::InvalidUrl { .. } => "invalid_url",
            RequestError::InvalidSpeech(_) => "invalid_speech",
            RequestError::CombinationLimitExceeded { .. } => "combination_limit_exceeded",
        }
    }
}

/// One voiceover line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SpeechText {
    /// Text to synthesize
    pub text: String,
    /// Human-readable voice name, matched case-insensitively
    pub voice: String,
}

impl SpeechText {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
        }
    }
}

/// Declarative description of a batch of video variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MediaRequest {
    /// Remote folder the rendered variants are uploaded under
    pub task_name: String,
    /// Block name -> candidate clip URLs
    pub video_blocks: BTreeMap<String, Vec<String>>,
    /// Block name -> candidate background track URLs
    pub audio_blocks: BTreeMap<String, Vec<String>>,
    /// Voiceover lines, one is picked per variant
    pub text_to_speech: Vec<SpeechText>,
}

impl MediaRequest {
    /// Check structural rules and the combination guard.
    pub fn validate(&self, max_combinations: u64) -> RequestResult<()> {
        validate_task_name(&self.task_name)?;

        if self.video_blocks.is_empty() {
            return Err(RequestError::NoVideoBlocks);
        }
        if self.audio_blocks.is_empty() {
            return Err(RequestError::NoAudioBlocks);
        }
        if self.text_to_speech.is_empty() {
            return Err(RequestError::NoSpeech);
        }

        for (name, urls) in self.video_blocks.iter().chain(self.audio_blocks.iter()) {
            validate_block(name, urls)?;
        }

        for (i, item) in self.text_to_speech.iter().enumerate() {
            if item.text.trim().is_empty() || item.voice.trim().is_empty() {
                return Err(RequestError::InvalidSpeech(i));
            }
        }

        let total = self.combination_count().ok_or(RequestError::CombinationLimitExceeded {
            total: u64::MAX,
            max: max_combinations,
        })?;
        if total > max_combinations {
            return Err(RequestError::CombinationLimitExceeded {
                total,
                max: max_combinations,
            });
        }

        Ok(())
    }

    /// Number of video variants this request expands to. `None` on overflow.
    pub fn combination_count(&self) -> Option<u64> {
        combination_count(self.video_blocks.values().map(Vec::len))
    }
}

fn validate_task_name(name: &str) -> RequestResult<()> {
    if name.is_empty() {
        return Err(RequestError::invalid_task_name("must not be empty"));
    }
    if name.len() > MAX_TASK_NAME_LEN {
        return Err(RequestError::invalid_task_name(format!(
            "longer than {} characters",
            MAX_TASK_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RequestError::invalid_task_name(format!(
            "'{}' may only contain letters, digits, '_' and '-'",
            name
        )));
    }
    Ok(())
}

fn validate_block(name: &str, urls: &[String]) -> RequestResult<()> {
    if urls.is_empty() {
        return Err(RequestError::EmptyBlock(name.to_string()));
    }
    for raw in urls {
        let valid = Url::parse(raw)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
            .unwrap_or(false);
        if !valid {
            return Err(RequestError::InvalidUrl {
                block: name.to_string(),
                url: raw.clone(),
            });
        }
    }
    Ok(())
}

/// Product of block sizes. An empty set of blocks yields zero variants.
pub fn combination_count<I>(sizes: I) -> Option<u64>
where
    I: IntoIterator<Item = usize>,
{
    let mut sizes = sizes.into_iter().peekable();
    if sizes.peek().is_none() {
        return Some(0);
    }
    sizes.try_fold(1u64, |acc, n| acc.checked_mul(n as u64))
}

/// Sort key for block names: the first run of decimal digits.
///
/// Names without digits sort after every numbered name, and ties fall back
/// to the name itself.
pub fn block_order_key(name: &str) -> (bool, u64, &str) {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        (true, 0, name)
    } else {
        (false, digits.parse().unwrap_or(u64::MAX), name)
    }
}

/// Order block names by [`block_order_key`].
pub fn ordered_block_names<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_by(|a, b| block_order_key(a).cmp(&block_order_key(b)));
    names
}
