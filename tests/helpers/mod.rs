pub mod assertions;
pub mod builders;
pub mod db;

pub use assertions::{assert_consistent, assert_gone, assert_indexed};
pub use builders::{fixtures, role_dn, EntryBuilder, ACCOUNT};
pub use db::TestDb;
