use std::fmt::Debug;
pub mod error;
pub mod result;

pub trait AddDebugObjectAndFnName<S: Into<String>, O: Debug + 'static> {
    fn add_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self;
}

pub trait AddMsg<S: Into<String>> {
    fn add_msg(self, msg: S) -> Self;
}

pub trait AddFunctionName<S: Into<String>> {
    fn add_fn_name(self, fn_name: S) -> Self;
}

/// How the caller should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected miss, the affected record is skipped.
    NotFound,
    /// Worth retrying on a later cycle.
    Transient,
    /// Retrying will not help.
    Fatal,
}
