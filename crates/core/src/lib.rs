pub mod config;
pub mod corpus;
pub mod default_paths;
pub mod error;
pub mod filesystem;
pub mod index;
pub mod mutation;
pub mod query;
pub mod service;
pub mod tags;
pub mod watcher;

// Re-export main types for convenience
pub use config::TagConfig;
pub use corpus::{CorpusReader, CorpusWriter, MemoryCorpus};
pub use default_paths::get_default_notes_path;
pub use error::{Error, Result};
pub use filesystem::NoteFilesystem;
pub use index::{IndexBuild, SkippedNote, SortOrder, TagEntry, TagIndex};
pub use mutation::{MutationReport, PartialFailure, TagMutator};
pub use query::{ContentSearch, SubstringSearch, TagQuery, evaluate, parse_query, suggest_tags};
pub use service::TagService;
pub use tags::{Tag, TagEdit, extract_tags, is_valid_tag, to_display_form, to_storage_form};
pub use watcher::{WatcherEvent, setup_watcher};
