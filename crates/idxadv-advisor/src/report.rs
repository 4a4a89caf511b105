//! # Result Streams
//!
//! Four per-session streams are appended to as the workload runs, one record
//! per statement, each prefixed with a fixed-width query counter:
//!
//! - `{key}_OCOST`:  original plan cost
//! - `{key}_OVCOST`: virtual plan cost
//! - `{key}_OINDEX`: the chosen virtual indexes
//! - `{key}_ORIGIN`: a combined summary record
//!
//! On finalization, `{key}_RESULT` is rewritten with the ranked candidates,
//! one record per candidate: `table: (c1,c2,...)    benefit`.

use crate::session::{CandidateIdx, VirtualIndex};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Four-space field separator in the summary stream.
const SEP: &str = "    ";

#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append the per-statement records for one planning outcome.
    pub fn write_query_outcome(
        &self,
        key: &str,
        query_count: u64,
        original_cost: f64,
        virtual_cost: f64,
        indexes: &[VirtualIndex],
    ) -> std::io::Result<()> {
        let idx_info = build_index_output(indexes);
        self.append(
            &format!("{key}_OCOST"),
            &format!("{query_count:<10}{original_cost:.6}\n"),
        )?;
        self.append(
            &format!("{key}_OVCOST"),
            &format!("{query_count:<10}{virtual_cost:.6}\n"),
        )?;
        self.append(
            &format!("{key}_OINDEX"),
            &format!("{query_count:<10}{{{idx_info}}}\n"),
        )?;
        self.append(
            &format!("{key}_ORIGIN"),
            &format!(
                "{query_count:<10}{original_cost:.6}{SEP}{virtual_cost:.6}{SEP}{{{idx_info}}}\n"
            ),
        )
    }

    /// Rewrite the final ranked result for a session.
    pub fn write_final_result(
        &self,
        key: &str,
        ranked: &[CandidateIdx],
    ) -> std::io::Result<()> {
        let mut content = String::new();
        for candidate in ranked {
            let cols: Vec<&str> = candidate
                .index
                .index
                .columns
                .iter()
                .map(|c| c.name.lowered.as_str())
                .collect();
            content.push_str(&format!(
                "{}: ({}){SEP}{:.6}\n",
                candidate.index.table.lowered,
                cols.join(","),
                candidate.benefit
            ));
        }
        std::fs::write(self.dir.join(format!("{key}_RESULT")), content)
    }

    fn append(&self, file: &str, content: &str) -> std::io::Result<()> {
        let mut fd = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        fd.write_all(content.as_bytes())
    }
}

/// Render chosen indexes as `(c1 c2) (c3) `, one parenthesized group per
/// index with columns space-joined; empty input renders as nothing.
pub fn build_index_output(indexes: &[VirtualIndex]) -> String {
    let mut out = String::new();
    for index in indexes {
        let cols: Vec<&str> = index
            .index
            .columns
            .iter()
            .map(|c| c.name.lowered.as_str())
            .collect();
        out.push_str(&format!("({}) ", cols.join(" ")));
    }
    out
}
