use std::fs::Metadata;
use std::os::windows::fs::MetadataExt;
use std::path::Path;
use winapi::um::winnt::{FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_SYSTEM};

use super::SystemFileProbe;

/// Reads the DOS hidden/system attribute bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeProbe;

impl SystemFileProbe for AttributeProbe {
    fn is_hidden(&self, _path: &Path, metadata: &Metadata) -> bool {
        metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
    }

    fn is_system_file(&self, _path: &Path, metadata: &Metadata) -> bool {
        metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
    }
}
