//! Outfit recommendations from a user's own wardrobe.
//!
//! Stylist is an HTTP service where an authenticated user uploads photos of
//! clothing and then asks, in free text, what to wear. Each photo is scored
//! against the prompt by a CLIP joint image-text model and the best match is
//! returned.
//!
//! # Architecture
//!
//! - **Scoring**: CLIP ViT-B/32 on ONNX Runtime; one `logits_per_image` value
//!   per (image, prompt) pair, with the prompt wrapped in a fixed template
//! - **Selection**: argmax over the scores, first candidate wins ties,
//!   non-finite scores are skipped
//! - **Storage**: write-once filesystem object store with HMAC-signed URLs,
//!   SQLite item catalog
//! - **Transport**: axum HTTP with per-route, per-client rate limits
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`candidate`]: Decoded 224x224 candidate images
//! - [`scoring`]: The [`scoring::Scorer`] trait and the CLIP implementation
//! - [`outfit`]: Best-candidate selection
//! - [`auth`]: Bearer-token verification
//! - [`identity`]: Sign-up, confirmation and login pass-through
//! - [`storage`]: Object store for uploaded images
//! - [`db`], [`catalog`]: SQLite item catalog
//! - [`ratelimit`]: Token-bucket rate limiting
//! - [`server`]: HTTP routes and startup

pub mod auth;
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod db;
pub mod identity;
pub mod outfit;
pub mod ratelimit;
pub mod scoring;
pub mod server;
pub mod storage;
