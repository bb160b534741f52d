pub mod archive_writer;
pub mod backup_config;
pub mod compress;
pub mod controller;
pub mod copy_policy;
pub mod destination;
pub mod discovery;
pub mod file_ext;
pub mod finish;
pub mod path_unit;
pub mod progress;
pub mod result_error;
pub mod stat;
pub mod tar;
pub mod validate;
pub mod work_queue;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
