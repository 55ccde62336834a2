//! REST collaborator: organization structure, node mutations and expenses.

pub mod client;
pub mod requests;
pub mod slot;

pub use client::Client;
pub use requests::{CreateCategoryReq, CreateDepartmentReq, CreateSubcategoryReq, DecisionReq, UpdateNodeReq};
pub use slot::RequestSlot;
