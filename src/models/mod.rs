mod blobs;
mod category;
mod expense;

pub use blobs::{
    BackupBlob, CategoryStats, ExportMetadata, FileExport, MetaBlob, NotesBlob, StoreExport,
};
pub use category::Category;
pub use expense::{CategorizedExpense, ExpenseRecord, NewExpense};

/// Version stamp written into every persisted blob and export artifact.
pub const DATA_VERSION: &str = "2.0";
