// TFS data model, line-oriented reader/writer and error modeling.
pub mod document;
pub mod error;
pub mod header;
pub mod reader;
pub mod table;
pub mod value;
pub mod writer;
