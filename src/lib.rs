//! Voice-augmented search: ask a question, hear a grounded answer.
//!
//! A query goes to a generative backend with web search enabled; the
//! summary it returns is converted to speech and played, while the sources
//! and an activity log stay available to the front end.
//!
//! * [`assistant`]: the remote backend (search, query rewrites, speech).
//! * [`audio`]: PCM decoding and the shared playback output.
//! * [`pipeline`]: the search flow state machine.
//! * [`history`]: recent searches for this session.
//! * [`config`]: `settings.toml` persistence.

pub mod assistant;
pub mod audio;
pub mod config;
pub mod history;
pub mod pipeline;
