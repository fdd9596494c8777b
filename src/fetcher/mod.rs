pub mod archive;
pub mod downloader;

pub use archive::{extract_archive, sha256_file, ArchiveValidator};
pub use downloader::{ArchiveDownloader, FetchProgress, FetchedArchive};
