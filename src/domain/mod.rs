pub mod booking;
pub mod class;
pub mod credit;
pub mod membership;
pub mod search;
pub mod user;

pub use booking::{Booking, BookingDetails, BookingField, BookingStatus, RefundPolicy};
pub use class::{ClassChanges, ClassField, ClassSession, ClassSummary, NewClass};
pub use credit::{CreditEvent, CreditReason};
pub use membership::{Membership, MembershipChange, MembershipDetails, MembershipField};
pub use search::{Page, Query, SearchOptions, SortDirection};
pub use user::{Role, User, UserField, UserSummary};
