use std::path::{Path, PathBuf};

use relative_path::{RelativePath, RelativePathBuf};
use serde_json::{Map, Value};

use crate::codec::Endian;
use crate::error::{Error, Result};

/// Lexical state of one step of a pass.
///
/// Never mutated in place: entering a subtree that changes the byte order,
/// the directory, the file or the sequence position derives a new scope, so
/// an override can not leak into sibling subtrees.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    endian: Option<Endian>,
    trail: String,
    dir: PathBuf,
    file: Option<PathBuf>,
    index: Option<usize>,
}

impl Scope {
    pub(crate) fn new(dir: PathBuf) -> Scope {
        Scope {
            endian: None,
            trail: dir.display().to_string(),
            dir,
            file: None,
            index: None,
        }
    }

    /// Logical path, used for diagnostics.
    pub(crate) fn path(&self) -> &str {
        &self.trail
    }

    pub(crate) fn endian(&self) -> Option<Endian> {
        self.endian
    }

    pub(crate) fn require_endian(&self) -> Result<Endian> {
        self.endian.ok_or_else(|| Error::MissingEndianness {
            path: self.trail.clone(),
        })
    }

    pub(crate) fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub(crate) fn with_endian(&self, endian: Endian) -> Scope {
        Scope {
            endian: Some(endian),
            ..self.clone()
        }
    }

    pub(crate) fn field(&self, segment: &str) -> Scope {
        Scope {
            trail: format!("{}/{}", self.trail, segment),
            ..self.clone()
        }
    }

    pub(crate) fn item(&self, index: usize) -> Scope {
        Scope {
            trail: format!("{}/[{}]", self.trail, index),
            index: Some(index),
            ..self.clone()
        }
    }

    pub(crate) fn enter_dir(&self, rel: &RelativePath) -> Scope {
        let dir = rel.to_path(&self.dir);
        let trail = match self.file() {
            Some(_) => format!("{}/{}", self.trail, rel),
            None => dir.display().to_string(),
        };
        Scope {
            trail,
            dir,
            ..self.clone()
        }
    }

    pub(crate) fn enter_file(&self, rel: &RelativePath) -> Result<Scope> {
        let path = rel.to_path(&self.dir);
        if self.file().is_some() {
            return Err(Error::NestedFile {
                path: path.display().to_string(),
            });
        }
        Ok(Scope {
            trail: path.display().to_string(),
            file: Some(path),
            index: None,
            ..self.clone()
        })
    }
}

/// Splits the target of a schema without any `file` node into the directory
/// scope and the name of the file synthesized for it.
pub(crate) fn split_target(path: &Path) -> Result<(PathBuf, RelativePathBuf)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidTarget(path.to_path_buf()))?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((dir, RelativePathBuf::from(name.to_string())))
}

/// What user callbacks get to see of the pass they run in.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub(crate) path: &'a str,
    pub(crate) index: Option<usize>,
    pub(crate) endian: Option<Endian>,
    pub(crate) user: &'a Value,
    pub(crate) record: &'a Map<String, Value>,
}

impl<'a> FieldContext<'a> {
    pub(crate) fn new(scope: &'a Scope, user: &'a Value, record: &'a Map<String, Value>) -> Self {
        FieldContext {
            path: scope.path(),
            index: scope.index(),
            endian: scope.endian(),
            user,
            record,
        }
    }

    /// Logical path of the field being resolved.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Position within the innermost sequence, if any.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn endian(&self) -> Option<Endian> {
        self.endian
    }

    /// The user context given in the pass options.
    pub fn user(&self) -> &'a Value {
        self.user
    }

    /// Values already written or read in the current record.
    pub fn record(&self) -> &'a Map<String, Value> {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivations_do_not_leak() {
        let root = Scope::new(PathBuf::from("out"));
        let be = root.with_endian(Endian::Big);
        let file = be.enter_file(RelativePath::new("a.bin")).unwrap();
        let item = file.field("points").item(3);

        assert_eq!(root.endian(), None);
        assert_eq!(item.endian(), Some(Endian::Big));
        assert_eq!(item.index(), Some(3));
        assert_eq!(file.index(), None);
        assert_eq!(item.path(), format!("{}/points/[3]", file.path()));
        assert_eq!(file.file(), Some(Path::new("out").join("a.bin").as_path()));
    }

    #[test]
    fn file_within_file_is_refused() {
        let file = Scope::new(PathBuf::from("out"))
            .enter_file(RelativePath::new("a.bin"))
            .unwrap();
        let err = file.enter_file(RelativePath::new("b.bin")).unwrap_err();
        assert!(matches!(err, Error::NestedFile { .. }));
    }

    #[test]
    fn endianness_is_never_implicit() {
        let scope = Scope::new(PathBuf::from("out"));
        assert!(matches!(
            scope.require_endian(),
            Err(Error::MissingEndianness { .. })
        ));
    }

    #[test]
    fn targets_split_into_scope_and_name() {
        let (dir, name) = split_target(Path::new("out/data/a.bin")).unwrap();
        assert_eq!(dir, Path::new("out/data"));
        assert_eq!(name.as_str(), "a.bin");

        let (dir, _) = split_target(Path::new("a.bin")).unwrap();
        assert_eq!(dir, Path::new(""));

        assert!(matches!(
            split_target(Path::new("..")),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[test]
    fn directories_nest() {
        let scope = Scope::new(PathBuf::from("out")).enter_dir(RelativePath::new("a/b"));
        assert_eq!(scope.dir(), Path::new("out").join("a").join("b"));
    }
}
