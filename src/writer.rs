//! The writer contract shared by every archive backend

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Format-specific half of an archive writer.
///
/// Targets handed to a backend already carry the archive root prefix.
pub trait Backend {
    /// Add an on-disk file, directory or symlink under `target`
    fn add_entry(&mut self, source: &Path, target: &Path) -> Result<()>;

    /// Add `data` under `target`, taking entry metadata from `reference`
    fn add_bytes_entry(&mut self, reference: &Path, data: &[u8], target: &Path) -> Result<()>;

    /// Finalize the archive stream.
    ///
    /// Called exactly once by [`ArchiveWriter`].
    fn finish(&mut self) -> Result<()>;
}

/// An open archive accepting entries below a common root.
///
/// The underlying archive handle is finalized by [`ArchiveWriter::finish`],
/// or on drop when the writer is abandoned.
pub struct ArchiveWriter<'a> {
    name: String,
    arcroot: PathBuf,
    backend: Box<dyn Backend + 'a>,
    finished: bool,
}

impl<'a> ArchiveWriter<'a> {
    /// Wrap an already opened backend
    pub fn new(
        name: impl Into<String>,
        arcroot: impl Into<PathBuf>,
        backend: Box<dyn Backend + 'a>,
    ) -> Self {
        ArchiveWriter {
            name: name.into(),
            arcroot: arcroot.into(),
            backend,
            finished: false,
        }
    }

    /// Name of the archive being written
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix applied to every entry path
    pub fn arcroot(&self) -> &Path {
        &self.arcroot
    }

    /// Add the file, directory or symlink at `source` as `arcroot/target`.
    ///
    /// Directories are added without their contents.
    pub fn add<S: AsRef<Path>, T: AsRef<Path>>(&mut self, source: S, target: T) -> Result<()> {
        let target = self.arcroot.join(target);
        trace!("{}: add {:?} as {:?}", self.name, source.as_ref(), target);
        self.backend.add_entry(source.as_ref(), &target)
    }

    /// Add `data` as `arcroot/target` with the metadata of `reference`
    pub fn add_bytes<S: AsRef<Path>, T: AsRef<Path>>(
        &mut self,
        reference: S,
        data: &[u8],
        target: T,
    ) -> Result<()> {
        let target = self.arcroot.join(target);
        trace!(
            "{}: add {} bytes as {:?} (metadata from {:?})",
            self.name,
            data.len(),
            target,
            reference.as_ref()
        );
        self.backend
            .add_bytes_entry(reference.as_ref(), data, &target)
    }

    /// Finish writing and close the archive
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        debug!("{}: finishing archive", self.name);
        self.backend.finish()
    }
}

impl Drop for ArchiveWriter<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("{}: failed to finish abandoned archive: {}", self.name, err);
        }
    }
}

/// Run `body` against `writer`, finishing the archive on every exit path.
///
/// An error from `body` takes precedence over one from finishing.
pub fn scoped<T, F>(mut writer: ArchiveWriter<'_>, body: F) -> Result<T>
where
    F: FnOnce(&mut ArchiveWriter<'_>) -> Result<T>,
{
    match body(&mut writer) {
        Ok(value) => {
            writer.finish()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = writer.close() {
                warn!(
                    "{}: failed to finish archive after error: {}",
                    writer.name, close_err
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        entries: Vec<String>,
        finished: usize,
    }

    struct Recording(Rc<RefCell<Log>>);

    impl Backend for Recording {
        fn add_entry(&mut self, _source: &Path, target: &Path) -> Result<()> {
            self.0.borrow_mut().entries.push(target.display().to_string());
            Ok(())
        }

        fn add_bytes_entry(&mut self, _reference: &Path, data: &[u8], target: &Path) -> Result<()> {
            self.0
                .borrow_mut()
                .entries
                .push(format!("{}={}", target.display(), data.len()));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.0.borrow_mut().finished += 1;
            Ok(())
        }
    }

    fn writer(log: &Rc<RefCell<Log>>) -> ArchiveWriter<'static> {
        ArchiveWriter::new("test", "root", Box::new(Recording(log.clone())))
    }

    #[test]
    fn test_targets_are_joined_under_arcroot() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut archive = writer(&log);
        archive.add("/src/a", "a").unwrap();
        archive.add_bytes("/src/b", b"hello", "sub/b").unwrap();
        archive.finish().unwrap();

        let log = log.borrow();
        assert_eq!(log.entries, vec!["root/a", "root/sub/b=5"]);
        assert_eq!(log.finished, 1);
    }

    #[test]
    fn test_drop_finishes_once() {
        let log = Rc::new(RefCell::new(Log::default()));
        {
            let mut archive = writer(&log);
            archive.add("/src/a", "a").unwrap();
        }
        assert_eq!(log.borrow().finished, 1);
    }

    #[test]
    fn test_scoped_finishes_on_error() {
        let log = Rc::new(RefCell::new(Log::default()));
        let result: Result<()> = scoped(writer(&log), |archive| {
            archive.add("/src/a", "a")?;
            Err(Error::InvalidArgument("boom".to_string()))
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(log.borrow().finished, 1);
    }

    #[test]
    fn test_scoped_returns_body_value() {
        let log = Rc::new(RefCell::new(Log::default()));
        let count = scoped(writer(&log), |archive| {
            archive.add("/src/a", "a")?;
            archive.add("/src/b", "b")?;
            Ok(2)
        })
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(log.borrow().finished, 1);
    }
}
