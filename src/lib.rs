//! # gitcomai
//!
//! Generates gitmoji-flavoured conventional commit messages for staged git
//! changes with hosted (Anthropic, OpenAI, Mistral, Google Gemini) or local
//! (Ollama) language models.
//!
//! The message streams in as the model writes it: partial structured output
//! is merged field by field and rendered live, and the final message is
//! priced against the bundled model catalog.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gitcomai::ai::CommitGenerator;
//! use gitcomai::config::FileConfigSource;
//! use gitcomai::git::GitRepository;
//! use gitcomai::ui::{ConsoleNotifier, LiveCommitInput, TerminalProgress};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let repo = GitRepository::open()?;
//! if let Some(diff) = repo.staged_diff()? {
//!     let generator = CommitGenerator::new(Arc::new(FileConfigSource::from_default_path()?));
//!     let message = generator
//!         .generate(
//!             &diff,
//!             &repo.staged_files()?,
//!             &TerminalProgress::deferred(),
//!             &LiveCommitInput::new(),
//!             &ConsoleNotifier::new(),
//!             &CancellationToken::new(),
//!         )
//!         .await;
//!     println!("{message:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ai;
pub mod cli;
pub mod config;
pub mod git;
pub mod ollama;
pub mod prompts;
pub mod ui;

pub use crate::cli::Cli;

/// The current version of gitcomai.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
