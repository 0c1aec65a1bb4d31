//! CSV import and export of credit ledgers.

pub mod credit_reader;
pub mod credit_writer;

/// Column order shared by the reader and the writer.
pub const CREDIT_COLUMNS: [&str; 10] = [
    "id",
    "amount",
    "currency",
    "source",
    "earnedDate",
    "expirationDate",
    "status",
    "redeemedDate",
    "redeemedBillId",
    "redeemedAmount",
];
