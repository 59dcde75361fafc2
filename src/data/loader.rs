// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads the line-aligned files that make up one split:
//
//   <split>.ids.from   space-separated source token ids, one utterance per line
//   <split>.ids.to     space-separated target token ids, aligned with .from
//   <split>.from       the raw source utterances (for copy resolution)
//   <split>.to         the raw target utterances (gold references)
//
// A tagging split replaces the target files with
//
//   <split>.ids.tags   one label id per source token, aligned with .ids.from
//
// and needs no text: its gold answer is the label ids themselves.
//
// Id lines are parsed as they are read; a non-integer token is a
// fatal configuration error reported with file and line number.
// Each denoising target gets EOS appended before it is bucketed.
//
// Denoising target ids at or above the target vocabulary size
// address a source position (copy range). Those are checked
// against the paired source length here, and tag lines against
// their token count, so a bad file fails at load time rather than
// deep inside a training step.
//
// Reference: Rust Book §12 (I/O), §9 (Error Handling)

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::data::dataset::BucketedDataset;
use crate::data::preprocessor::Preprocessor;
use crate::domain::error::DataError;
use crate::domain::sequence::{Bucket, SequencePair};
use crate::domain::task::Task;
use crate::domain::vocabulary::EOS_ID;

/// Tokenized text of one line, used to judge and resolve hypotheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: Vec<String>,
    pub target: Vec<String>,
}

/// Everything loaded for one split. Tagging splits carry no references.
#[derive(Debug, Clone)]
pub struct Split {
    pub name:       String,
    pub dataset:    BucketedDataset,
    pub references: Vec<Reference>,
}

/// File locations of one split inside a data directory.
#[derive(Debug, Clone)]
pub struct SplitFiles {
    pub source_ids:  PathBuf,
    pub target_ids:  PathBuf,
    pub source_text: PathBuf,
    pub target_text: PathBuf,
}

impl SplitFiles {
    pub fn in_dir(data_dir: &Path, split: &str) -> Self {
        Self {
            source_ids:  data_dir.join(format!("{split}.ids.from")),
            target_ids:  data_dir.join(format!("{split}.ids.to")),
            source_text: data_dir.join(format!("{split}.from")),
            target_text: data_dir.join(format!("{split}.to")),
        }
    }

    /// Files of a tagging split; only the two id paths are read.
    pub fn tagging(data_dir: &Path, split: &str) -> Self {
        Self {
            target_ids: data_dir.join(format!("{split}.ids.tags")),
            ..Self::in_dir(data_dir, split)
        }
    }

    pub fn for_task(task: Task, data_dir: &Path, split: &str) -> Self {
        match task {
            Task::Denoise => Self::in_dir(data_dir, split),
            Task::Tag => Self::tagging(data_dir, split),
        }
    }
}

pub struct DatasetLoader {
    buckets:           Vec<Bucket>,
    /// Target tokens for denoising, labels for tagging.
    target_vocab_size: usize,
    task:              Task,
    preprocessor:      Preprocessor,
}

impl DatasetLoader {
    #[cfg(test)]
    pub fn new(buckets: &[Bucket], target_vocab_size: usize) -> Self {
        Self::for_task(Task::Denoise, buckets, target_vocab_size)
    }

    pub fn for_task(task: Task, buckets: &[Bucket], target_vocab_size: usize) -> Self {
        Self {
            buckets: buckets.to_vec(),
            target_vocab_size,
            task,
            preprocessor: Preprocessor::new(),
        }
    }

    /// Load ids and references for a split. `max_size` of 0 reads everything.
    pub fn load_split(&self, name: &str, files: &SplitFiles, max_size: usize) -> Result<Split> {
        tracing::info!("Reading {name} data (limit: {max_size})");

        let dataset = self.read_data(&files.source_ids, &files.target_ids, max_size)?;
        let references = match self.task {
            Task::Denoise => self.read_references(&files.source_text, &files.target_text)?,
            Task::Tag => Vec::new(),
        };

        if let Some(line) = (0..self.buckets.len())
            .flat_map(|b| dataset.bucket(b).iter().map(|p| p.line))
            .find(|&line| self.task == Task::Denoise && line >= references.len())
        {
            return Err(DataError::MissingReference { line, available: references.len() })
                .with_context(|| format!("{name}: id files and text files are not aligned"));
        }

        tracing::info!(
            "{name}: {} pairs in buckets {:?}, {} dropped as too long",
            dataset.len(),
            dataset.bucket_sizes(),
            dataset.dropped()
        );

        Ok(Split { name: name.to_string(), dataset, references })
    }

    /// Read aligned id files into buckets.
    pub fn read_data(&self, source: &Path, target: &Path, max_size: usize) -> Result<BucketedDataset> {
        let open = |p: &Path| -> Result<BufReader<File>> {
            let f = File::open(p).with_context(|| format!("Cannot open '{}'", p.display()))?;
            Ok(BufReader::new(f))
        };
        self.read_pairs(open(source)?, source, open(target)?, target, max_size)
    }

    /// Reader-generic core of `read_data`; paths are only used in errors.
    pub fn read_pairs<R: BufRead>(
        &self,
        source:      R,
        source_path: &Path,
        target:      R,
        target_path: &Path,
        max_size:    usize,
    ) -> Result<BucketedDataset> {
        let mut dataset = BucketedDataset::new(&self.buckets);

        for (line, (src, tgt)) in source.lines().zip(target.lines()).enumerate() {
            if max_size > 0 && line >= max_size {
                break;
            }
            if (line + 1) % 100 == 0 {
                tracing::info!("  reading data line {}", line + 1);
            }

            let src = src.with_context(|| format!("Cannot read '{}'", source_path.display()))?;
            let tgt = tgt.with_context(|| format!("Cannot read '{}'", target_path.display()))?;

            let source_ids = parse_ids(&src, source_path, line + 1)?;
            let mut target_ids = parse_ids(&tgt, target_path, line + 1)?;
            match self.task {
                Task::Denoise => {
                    self.check_copy_ids(&target_ids, source_ids.len(), line + 1)?;
                    target_ids.push(EOS_ID);
                }
                Task::Tag => self.check_tags(&target_ids, source_ids.len(), line + 1)?,
            }

            dataset.insert(SequencePair::new(source_ids, target_ids, line));
        }

        Ok(dataset)
    }

    fn check_copy_ids(&self, target: &[u32], source_len: usize, line: usize) -> Result<(), DataError> {
        let vocab_size = self.target_vocab_size as u32;
        match target
            .iter()
            .find(|&&id| id >= vocab_size && (id - vocab_size) as usize >= source_len)
        {
            Some(&id) => Err(DataError::CopyIdOutOfRange { line, id, vocab_size, source_len }),
            None => Ok(()),
        }
    }

    fn check_tags(&self, tags: &[u32], source_len: usize, line: usize) -> Result<(), DataError> {
        if tags.len() != source_len {
            return Err(DataError::TagCountMismatch { line, tokens: source_len, tags: tags.len() });
        }
        match tags.iter().find(|&&id| id as usize >= self.target_vocab_size) {
            Some(&id) => Err(DataError::LabelOutOfRange { line, id, labels: self.target_vocab_size }),
            None => Ok(()),
        }
    }

    /// Read the raw utterance files and tokenize each line.
    pub fn read_references(&self, source: &Path, target: &Path) -> Result<Vec<Reference>> {
        let sources = self.read_tokenized(source)?;
        let targets = self.read_tokenized(target)?;
        Ok(sources
            .into_iter()
            .zip(targets)
            .map(|(source, target)| Reference { source, target })
            .collect())
    }

    fn read_tokenized(&self, path: &Path) -> Result<Vec<Vec<String>>> {
        let file = File::open(path).with_context(|| format!("Cannot open '{}'", path.display()))?;
        BufReader::new(file)
            .lines()
            .map(|line| {
                let line = line.with_context(|| format!("Cannot read '{}'", path.display()))?;
                Ok(self.preprocessor.tokenize(&line))
            })
            .collect()
    }
}

fn parse_ids(line: &str, path: &Path, line_no: usize) -> Result<Vec<u32>, DataError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u32>().map_err(|_| DataError::MalformedToken {
                path:  path.to_path_buf(),
                line:  line_no,
                token: tok.to_string(),
            })
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn loader() -> DatasetLoader {
        DatasetLoader::new(&[Bucket::new(4, 4)], 10)
    }

    fn read(src: &str, tgt: &str, max_size: usize) -> Result<BucketedDataset> {
        loader().read_pairs(
            Cursor::new(src.to_string()),
            Path::new("src"),
            Cursor::new(tgt.to_string()),
            Path::new("tgt"),
            max_size,
        )
    }

    #[test]
    fn test_targets_get_eos_and_long_pairs_drop() {
        let ds = read("4 5\n4 5 6 7 8\n6\n", "4\n4\n10\n", 0).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.dropped(), 1);
        let pairs = ds.bucket(0);
        assert_eq!(pairs[0].target, vec![4, EOS_ID]);
        // Line numbers survive the dropped pair.
        assert_eq!(pairs[1].line, 2);
        // 10 = vocab size + 0 → copy of source position 0.
        assert_eq!(pairs[1].target, vec![10, EOS_ID]);
    }

    #[test]
    fn test_malformed_token_is_fatal() {
        let err = read("4 x\n", "4\n", 0).unwrap_err();
        let data_err = err.downcast_ref::<DataError>().unwrap();
        assert!(matches!(data_err, DataError::MalformedToken { line: 1, token, .. } if token == "x"));
    }

    #[test]
    fn test_copy_id_past_source_is_fatal() {
        // Source has one token, so only id 10 is a valid copy.
        let err = read("4\n", "11\n", 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::CopyIdOutOfRange { id: 11, .. })
        ));
    }

    #[test]
    fn test_max_size_limits_lines() {
        let ds = read("4\n5\n6\n", "4\n5\n6\n", 2).unwrap();
        assert_eq!(ds.len(), 2);
    }

    fn read_tags(src: &str, tags: &str) -> Result<BucketedDataset> {
        DatasetLoader::for_task(Task::Tag, &[Bucket::new(4, 4)], 6).read_pairs(
            Cursor::new(src.to_string()),
            Path::new("src"),
            Cursor::new(tags.to_string()),
            Path::new("tags"),
            0,
        )
    }

    #[test]
    fn test_tag_targets_have_no_eos() {
        let ds = read_tags("7 8 9\n", "4 5 4\n").unwrap();
        assert_eq!(ds.bucket(0)[0].target, vec![4, 5, 4]);
    }

    #[test]
    fn test_tag_count_must_match_tokens() {
        let err = read_tags("7 8 9\n", "4 5\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::TagCountMismatch { line: 1, tokens: 3, tags: 2 })
        ));
    }

    #[test]
    fn test_tag_outside_label_vocab_is_fatal() {
        let err = read_tags("7\n", "6\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::LabelOutOfRange { id: 6, labels: 6, .. })
        ));
    }

    #[test]
    fn test_tagging_split_needs_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let files = SplitFiles::tagging(dir.path(), "train");
        assert!(files.target_ids.ends_with("train.ids.tags"));
        std::fs::write(&files.source_ids, "7 8\n9\n").unwrap();
        std::fs::write(&files.target_ids, "4 5\n4\n").unwrap();

        let split = DatasetLoader::for_task(Task::Tag, &[Bucket::new(4, 4)], 6)
            .load_split("train", &files, 0)
            .unwrap();
        assert_eq!(split.dataset.len(), 2);
        assert!(split.references.is_empty());
    }

    #[test]
    fn test_load_split_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = SplitFiles::in_dir(dir.path(), "dev");
        let write = |p: &Path, body: &str| {
            let mut f = File::create(p).unwrap();
            write!(f, "{body}").unwrap();
        };
        write(&files.source_ids, "4 5\n6\n");
        write(&files.target_ids, "4\n10\n");
        write(&files.source_text, "uh hello\nbob\n");
        write(&files.target_text, "hello\nbob\n");

        let split = loader().load_split("dev", &files, 0).unwrap();
        assert_eq!(split.dataset.len(), 2);
        assert_eq!(split.references[1].source, vec!["bob".to_string()]);
        assert_eq!(split.references[0].target, vec!["hello".to_string()]);
    }
}
