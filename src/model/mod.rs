//! Domain model: the entities of the reading marketplace, their enums, and invariants.

pub mod notification;
pub mod payout;
pub mod review;
pub mod session;
pub mod transaction;
pub mod user;

pub use notification::Notification;
pub use payout::{Payout, PayoutStatus};
pub use review::Review;
pub use session::{Message, Session, SessionStatus, SessionType};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{AccountStatus, ClientProfile, ReaderPresence, ReaderProfile, User, UserRole};
