pub mod codec;

pub use codec::{read_record, write_record};
