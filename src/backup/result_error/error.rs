use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg, ErrorClass};
use itertools::Itertools;
use std::fmt::Debug;
use thiserror::Error;

/// Exit code for any error that is not a startup precondition failure.
pub const EXIT_CODE_OTHER: i32 = 5;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("Unexpected response from {url}: {msg}")]
    UnexpectedResponse { url: String, msg: String },
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    #[error(transparent)]
    Precondition(#[from] Precondition),
    #[error("{0}")]
    Config(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

/// Conditions checked before any job runs. Each maps to its own exit code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    #[error("No NAS shares found")]
    NoShares,
    #[error("No SLA domains found")]
    NoSlaDomains,
    #[error("No filesets found")]
    NoFilesets,
    #[error("Can't find default fileset template: {0}")]
    FilesetTemplateNotFound(String),
}

impl Precondition {
    pub fn exit_code(&self) -> i32 {
        match self {
            Precondition::NoShares => 1,
            Precondition::NoSlaDomains => 2,
            Precondition::NoFilesets => 3,
            Precondition::FilesetTemplateNotFound(_) => 4,
        }
    }
}

impl<S: Into<String>, O: Debug + Send + 'static> AddDebugObjectAndFnName<S, O> for Error {
    fn add_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(
            errors
                .into_iter()
                .flat_map(|e| e.into_iter())
                .collect_vec(),
        )
    }
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found<S: Into<String>>(kind: &'static str, name: S) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Innermost error, looking through context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. }
            | Error::WithFnName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.root(),
            e => e,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.root() {
            Error::NotFound { .. } => ErrorClass::NotFound,
            Error::Reqwest(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ErrorClass::Transient
            }
            Error::Io(_) => ErrorClass::Transient,
            Error::HttpStatus { status, .. }
                if *status == 408 || *status == 429 || *status >= 500 =>
            {
                ErrorClass::Transient
            }
            Error::LotsOfError(v) => v
                .iter()
                .map(Error::class)
                .find(|c| *c != ErrorClass::Transient)
                .unwrap_or(ErrorClass::Transient),
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Error::Precondition(p) => p.exit_code(),
            Error::LotsOfError(v) => v.first().map(Error::exit_code).unwrap_or(EXIT_CODE_OTHER),
            _ => EXIT_CODE_OTHER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_add_msg() {
        let error = Error::config("bad value");
        let error_with_msg = error.add_msg("Custom message");

        match error_with_msg {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_add_debug_object_and_fn_name_display() {
        let error = Error::not_found("share", "nas01:/vol/a");
        let error_str = error
            .add_debug_object_and_fn_name(42, "resolve_share")
            .to_string();

        assert!(error_str.contains("resolve_share"));
        assert!(error_str.contains("failed"));
        assert!(error_str.contains("share not found: nas01:/vol/a"));
    }

    #[test]
    fn test_error_from_vec_flattens() {
        let nested = Error::config("a").chain(Error::config("b"));
        let combined = Error::from(vec![nested, Error::config("c")]);
        match combined {
            Error::LotsOfError(v) => assert_eq!(v.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let errors: Vec<Error> = vec![];
        let _error = Error::from(errors);
    }

    #[test]
    fn test_class_looks_through_wrappers() {
        let err = Error::not_found("SLA domain", "Gold")
            .add_msg("resolving")
            .add_fn_name("build");
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_class_http_status() {
        let status = |s| Error::HttpStatus {
            status: s,
            url: "https://cluster/api/v1/fileset".into(),
            body: String::new(),
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert_eq!(status(400).class(), ErrorClass::Fatal);
        assert_eq!(status(404).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::from(Precondition::NoShares).exit_code(), 1);
        assert_eq!(Error::from(Precondition::NoSlaDomains).exit_code(), 2);
        assert_eq!(Error::from(Precondition::NoFilesets).exit_code(), 3);
        assert_eq!(
            Error::from(Precondition::FilesetTemplateNotFound("tmpl".into()))
                .add_msg("startup")
                .exit_code(),
            4
        );
        assert_eq!(Error::config("x").exit_code(), EXIT_CODE_OTHER);
    }
}
