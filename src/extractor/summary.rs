//! Scalar summaries for monitoring training
//!
//! Summaries are written as TensorBoard event files under
//! `<folder>/summaries/`, readable with `tensorboard --logdir <folder>`.
//! Every attached writer opens its own `events.out.tfevents.*` file, so several
//! extractors (or several runs of the same one) may share a folder.

use std::fs;
use std::path::{Path, PathBuf};

use tensorboard_rs::summary_writer::SummaryWriter as EventWriter;

use super::error::Result;

/// Name of the monitoring directory under an extractor folder
pub const SUMMARY_DIR: &str = "summaries";

/// File name prefix of TensorBoard event files
pub const EVENT_FILE_PREFIX: &str = "events.out.tfevents";

/// One recorded scalar
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSummary {
    pub step: usize,
    pub tag: String,
    pub value: f32,
}

/// Writes scalar summaries to a TensorBoard event file under an extractor folder
pub struct SummaryWriter {
    dir: PathBuf,
    writer: EventWriter,
    written: usize,
    last: Option<ScalarSummary>,
}

impl SummaryWriter {
    /// Attach a writer to `folder`, creating `summaries/` if needed
    pub fn new(folder: &Path) -> Result<Self> {
        let dir = folder.join(SUMMARY_DIR);
        fs::create_dir_all(&dir)?;
        let writer = EventWriter::new(&dir);

        Ok(Self {
            dir,
            writer,
            written: 0,
            last: None,
        })
    }

    /// Directory holding the event files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record a scalar tagged with `step` and flush it to disk
    pub fn add_scalar(&mut self, tag: &str, value: f32, step: usize) {
        self.writer.add_scalar(tag, value, step);
        self.writer.flush();
        self.written += 1;
        self.last = Some(ScalarSummary {
            step,
            tag: tag.to_string(),
            value,
        });
    }

    /// Number of scalars recorded by this writer
    pub fn written(&self) -> usize {
        self.written
    }

    /// The most recently recorded scalar
    pub fn last(&self) -> Option<&ScalarSummary> {
        self.last.as_ref()
    }

    /// Event files currently present in [`Self::dir`]
    pub fn event_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_event_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(EVENT_FILE_PREFIX));
            if is_event_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
