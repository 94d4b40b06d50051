//! Chatvault Index Structures
//!
//! - **SpeakerIndex**: speaker → line offsets for one canonical day file
//!
//! # Architecture
//!
//! ```text
//! 2016-01-02.txt(.lz4)
//!        ↓  LineExtractor, one record per line
//! { "user1": [0, 212], "ban": [37] }
//!        ↓
//! 2016-01-02.txt.nicks.json
//! ```

mod speaker_index;

pub use speaker_index::{index_path, rebuild_index, IndexError, IndexResult, SpeakerIndex, INDEX_SUFFIX};
