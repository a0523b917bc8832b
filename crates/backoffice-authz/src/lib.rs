//! Authorization for back-office contracts.
//!
//! Every contract declares the [`Role`](backoffice_core::Role)s it admits and
//! an ordered list of policies. The [`Authorizer`] checks the caller's role
//! first and then runs each policy in order, stopping at the first denial.
//! A denied request never reaches its handler.
//!
//! Two families of policies are built in:
//!
//! - `store_access`: the POS session must be linked to the path's `store_id`
//! - `permission:<flag>`: the POS session must hold the permission flag
//!
//! Custom policies are registered on a [`PolicySet`].

mod decision;
mod error;
mod evaluator;
pub mod policy;

pub use decision::{Decision, DenyReason};
pub use error::{AuthzError, AuthzResult};
pub use evaluator::Authorizer;
pub use policy::{Permission, Policy, PolicyInput, PolicySet, StoreAccess};
