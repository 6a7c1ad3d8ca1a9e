//! Protobuf messages for federated trace payloads.
//!
//! `reports.rs` is a hand-carried transcription of the subset of the
//! Apollo usage-reporting proto that the executor reads and writes, in
//! the exact shape `prost-build` generates. Unknown fields in incoming
//! payloads are skipped by prost, so decoding a full trace with this
//! trimmed message set is lossy but safe.

pub mod reports;
