/// Suffixes of files copied as-is.
pub const TABULAR_SUFFIXES: &[&str] = &[".parquet"];

/// Suffixes of files that are extracted before publishing.
pub const ARCHIVE_SUFFIXES: &[&str] = &[".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tar.xz"];

/// A file listing split by how each file is handled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub tabular: Vec<String>,
    pub archives: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.tabular.is_empty() && self.archives.is_empty()
    }

    /// Every selected file, sorted and without duplicates.
    pub fn selected(&self) -> Vec<String> {
        let mut all: Vec<String> = self.tabular.iter().chain(&self.archives).cloned().collect();
        all.sort();
        all.dedup();
        all
    }
}

/// Split `/`-separated repository paths into tabular files and archives.
///
/// Any tabular suffix anywhere in the name wins. Archives are matched on
/// the last two suffixes merged (`.tar.gz`) before the last suffix alone.
/// Everything else is dropped.
pub fn classify<I, S>(files: I) -> Classification
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Classification::default();

    for file in files {
        let file = file.as_ref();
        let suffixes = suffixes(file);
        let Some(last) = suffixes.last() else {
            continue;
        };

        if suffixes.iter().any(|s| TABULAR_SUFFIXES.contains(s)) {
            out.tabular.push(file.to_string());
            continue;
        }

        let merged = match suffixes.len() {
            n if n >= 2 => format!("{}{}", suffixes[n - 2], suffixes[n - 1]),
            _ => (*last).to_string(),
        };
        if ARCHIVE_SUFFIXES.contains(&merged.as_str()) || ARCHIVE_SUFFIXES.contains(last) {
            out.archives.push(file.to_string());
        }
    }

    out
}

/// Suffixes of the final path segment, each with its leading dot.
fn suffixes(path: &str) -> Vec<&str> {
    let name = path.rsplit('/').next().unwrap_or(path).trim_start_matches('.');
    if name.ends_with('.') {
        return Vec::new();
    }

    let dots: Vec<usize> = name.match_indices('.').map(|(i, _)| i).collect();
    dots.iter()
        .enumerate()
        .map(|(n, &start)| &name[start..dots.get(n + 1).copied().unwrap_or(name.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_list() {
        assert_eq!(suffixes("a/b/part.tar.gz"), vec![".tar", ".gz"]);
        assert_eq!(suffixes("x.y.tar"), vec![".y", ".tar"]);
        assert!(suffixes("README").is_empty());
        assert!(suffixes(".hidden").is_empty());
        assert!(suffixes("weird.").is_empty());
    }

    #[test]
    fn splits_tabular_and_archives() {
        let files = [
            "data/train-00000.parquet",
            "audio/part-0.tar",
            "audio/part-1.tar.gz",
            "audio/part-2.tgz",
            "audio/part-3.tar.bz2",
            "audio/part-4.tar.xz",
            "README.md",
            ".gitattributes",
        ];

        let out = classify(files);

        assert_eq!(out.tabular, vec!["data/train-00000.parquet"]);
        assert_eq!(out.archives.len(), 5);
        assert!(!out.archives.iter().any(|f| f.ends_with(".md")));
    }

    #[test]
    fn dotted_stems_still_match_final_suffix() {
        let out = classify(["shards/v1.2.tar"]);
        assert_eq!(out.archives, vec!["shards/v1.2.tar"]);
    }

    #[test]
    fn plain_gzip_is_not_an_archive() {
        let out = classify(["logs/run.json.gz"]);
        assert!(out.is_empty());
    }

    #[test]
    fn selected_is_sorted_union() {
        let out = Classification {
            tabular: vec!["b.parquet".into()],
            archives: vec!["a.tar".into()],
        };
        assert_eq!(out.selected(), vec!["a.tar", "b.parquet"]);
    }
}
