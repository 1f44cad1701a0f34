//! Domain model: contracts, access control, the result protocol, and the
//! validation seam.

pub mod access;
pub mod contract;
pub mod result;
pub mod schema;
pub mod validation;

pub use contract::{
    AuthInput, AuthPolicy, Contract, ContractHandler, HandlerAuth, HttpMethod, Implementation,
    ManagedFields,
};
pub use result::{CrudResult, ErrorEnvelope, HandlingError, Success};
pub use schema::{BasicValidator, NoValidation, SchemaValidator, ValidationOutcome};
pub use validation::ValidatedContract;
