pub mod api;
pub mod catalog;
pub mod completion_log;
pub mod job;
pub mod orchestrator;
pub mod orchestrator_config;
pub mod queue_builder;
pub mod reconciler;
pub mod redacted;
pub mod report;
pub mod result_error;
pub mod scheduler;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
