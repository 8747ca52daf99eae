//! SQLite access for the SQL tool host.
//!
//! [`Database`] owns the one connection the host keeps for its whole
//! lifetime. [`Database::query`] runs a single statement under a
//! [`policy::Policy`] and returns a [`QueryOutput`], whose `Display` form is
//! the text handed back to the model.
//!
//! # Example
//!
//! ```no_run
//! use policy::Policy;
//! use storage::Database;
//!
//! let db = Database::open("database.db", Policy::permissive())?;
//! let output = db.query("SELECT name FROM users WHERE id = 1")?;
//! println!("{output}");
//! # Ok::<(), storage::Error>(())
//! ```

mod database;
mod error;
mod output;

pub use database::Database;
pub use error::{Error, Result};
pub use output::{NO_ROWS, QueryOutput};
pub use rusqlite::types::Value;
