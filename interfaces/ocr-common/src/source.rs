use std::fmt::Display;
use std::path::{Path, PathBuf};

/// A source for a file, either from Hugging Face or a local path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A file from Hugging Face
    HuggingFace {
        /// The model id to use
        model_id: String,
        /// The revision to use
        revision: String,
        /// The file to use
        file: String,
    },
    /// A local file
    Local(PathBuf),
}

impl Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => write!(f, "hf://{}/{}/{}", model_id, revision, file),
            FileSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FileSource {
    /// Create a new source for a file from Hugging Face
    pub fn huggingface(
        model_id: impl ToString,
        revision: impl ToString,
        file: impl ToString,
    ) -> Self {
        Self::HuggingFace {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
            file: file.to_string(),
        }
    }

    /// Create a new source for a local file
    pub fn local(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

/// An error parsing a model identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelIdentifierError {
    /// The identifier was empty
    #[error("the model identifier is empty")]
    Empty,
    /// The identifier ended with `@` and no revision
    #[error("the model identifier `{0}` has an empty revision")]
    EmptyRevision(String),
    /// The identifier is neither an existing directory nor a hub repository name
    #[error("`{0}` is neither a local directory nor a Hugging Face repository (`owner/name[@revision]`)")]
    Malformed(String),
}

/// Where the files of a pretrained model live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelLocation {
    /// A repository on the Hugging Face hub
    Hub {
        /// The repository id, `owner/name`
        model_id: String,
        /// The branch, tag or commit to read from
        revision: String,
    },
    /// A local directory laid out like a hub repository
    Directory(PathBuf),
}

impl ModelLocation {
    /// The revision used when an identifier does not name one.
    pub const DEFAULT_REVISION: &'static str = "main";

    /// Create a location for a hub repository at a revision
    pub fn hub(model_id: impl ToString, revision: impl ToString) -> Self {
        Self::Hub {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
        }
    }

    /// Parse a model identifier.
    ///
    /// An identifier naming an existing directory is a [`ModelLocation::Directory`]. Anything else must
    /// look like a hub repository, `name` or `owner/name`, optionally followed by `@revision`.
    pub fn parse(identifier: &str) -> Result<Self, ModelIdentifierError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ModelIdentifierError::Empty);
        }

        let path = Path::new(identifier);
        if path.is_dir() {
            return Ok(Self::Directory(path.to_path_buf()));
        }

        let (model_id, revision) = match identifier.split_once('@') {
            Some((_, "")) => return Err(ModelIdentifierError::EmptyRevision(identifier.into())),
            Some((model_id, revision)) => (model_id, revision),
            None => (identifier, Self::DEFAULT_REVISION),
        };

        let segments: Vec<_> = model_id.split('/').collect();
        let well_formed = matches!(segments.len(), 1 | 2)
            && segments.iter().all(|segment| {
                !segment.is_empty()
                    && segment != &"."
                    && segment != &".."
                    && !segment.chars().any(char::is_whitespace)
            });
        if !well_formed {
            return Err(ModelIdentifierError::Malformed(identifier.into()));
        }

        Ok(Self::hub(model_id, revision))
    }

    /// The source of one file of this model
    pub fn file(&self, file: &str) -> FileSource {
        match self {
            Self::Hub { model_id, revision } => FileSource::huggingface(model_id, revision, file),
            Self::Directory(path) => FileSource::local(path.join(file)),
        }
    }
}

impl Display for ModelLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hub { model_id, revision } if revision == Self::DEFAULT_REVISION => {
                write!(f, "{model_id}")
            }
            Self::Hub { model_id, revision } => write!(f, "{model_id}@{revision}"),
            Self::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}
