//! StoryVault Client SDK.
//!
//! A typed client for the StoryVault credits, contest voting and view
//! counting API.
//!
//! # Example
//!
//! ```no_run
//! use storyvault_client::{StoryVaultClient, Tier};
//!
//! # async fn example(id_token: &str) -> Result<(), storyvault_client::ClientError> {
//! let client = StoryVaultClient::new("http://storyvault.internal:8080")?;
//!
//! let vote = client
//!     .cast_vote(id_token, "spring-2026", "story-1", Tier::Free)
//!     .await?;
//!
//! println!("{} free votes left", vote.remaining.free);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, StoryVaultClient};
pub use error::ClientError;
pub use storyvault_core::{EntryReason, Tier, TierCounts, VoteTotals};
pub use types::*;
