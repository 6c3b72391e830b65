use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

/// One run of a batch: a sandbox name and the private workspace mounted into it.
///
/// Requests are only produced as a whole batch by [`RunRequest::batch`],
/// which is what keeps names unique: every name is `"{prefix}-{index}"` with a distinct index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunRequest {
    index: usize,
    name: String,
    workspace: PathBuf,
}

impl RunRequest {
    /// Build `count` requests named `"{prefix}-{index}"`.
    ///
    /// The index is zero-padded to the width of the largest index so that names sort
    /// in run order (`run-00` .. `run-11` for a batch of 12).
    /// Each workspace is `root/<name>`.
    pub fn batch(prefix: &str, count: NonZeroUsize, root: &Path) -> Vec<RunRequest> {
        let width = index_width(count);
        (0..count.get())
            .map(|index| {
                let name = format!("{prefix}-{index:0width$}");
                let workspace = root.join(&name);
                RunRequest {
                    index,
                    name,
                    workspace,
                }
            })
            .collect()
    }

    /// `[A-Za-z0-9][A-Za-z0-9_.-]*`: accepted by container runtimes as a name and
    /// never splits a workspace path.
    pub fn is_valid_prefix(prefix: &str) -> bool {
        let mut chars = prefix.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

fn index_width(count: NonZeroUsize) -> usize {
    (count.get() - 1).to_string().len()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn single_request_is_unpadded() {
        let reqs = RunRequest::batch("test-fio", nz(1), Path::new("/vol"));
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].name(), "test-fio-0");
        assert_eq!(reqs[0].index(), 0);
        assert_eq!(reqs[0].workspace(), Path::new("/vol/test-fio-0"));
    }

    #[test]
    fn indices_are_zero_padded_to_largest_index() {
        let reqs = RunRequest::batch("run", nz(12), Path::new("ws"));
        assert_eq!(reqs.first().unwrap().name(), "run-00");
        assert_eq!(reqs.last().unwrap().name(), "run-11");

        let reqs = RunRequest::batch("run", nz(10), Path::new("ws"));
        assert_eq!(reqs.last().unwrap().name(), "run-9");
    }

    #[test]
    fn exactly_n_unique_names_for_many_sizes() {
        for n in [1, 2, 3, 9, 10, 11, 99, 100, 101, 1000] {
            let reqs = RunRequest::batch("p", nz(n), Path::new("root"));
            assert_eq!(reqs.len(), n);

            let names: HashSet<_> = reqs.iter().map(|r| r.name().to_string()).collect();
            assert_eq!(names.len(), n, "duplicate names for n={n}");

            let dirs: HashSet<_> = reqs.iter().map(|r| r.workspace().to_path_buf()).collect();
            assert_eq!(dirs.len(), n, "shared workspace for n={n}");
        }
    }

    #[test]
    fn prefix_charset() {
        for ok in ["test-fio", "nvme0n1", "a", "9_x.y-z"] {
            assert!(RunRequest::is_valid_prefix(ok), "{ok}");
        }
        for bad in ["", " ", "-lead", ".hidden", "a/b", "../up", "has space", "tab\t", "ünicode"] {
            assert!(!RunRequest::is_valid_prefix(bad), "{bad:?}");
        }
    }

    #[test]
    fn names_sort_in_index_order() {
        let reqs = RunRequest::batch("p", nz(120), Path::new("root"));
        let mut names: Vec<_> = reqs.iter().map(|r| r.name().to_string()).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
    }
}
