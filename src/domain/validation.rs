//! Contract validation wrapper: schema checks at the contract entry and exit
//! boundaries, producing the result protocol.

use crate::domain::contract::{AuthInput, Contract, ContractHandler, HandlerAuth};
use crate::domain::result::CrudResult;
use crate::domain::schema::SchemaValidator;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// A contract paired with its resolved handler and a validator. Input is
/// validated before the handler runs, output after; both failures surface as
/// error envelopes, never as `Err`.
pub struct ValidatedContract {
    contract: Arc<Contract>,
    handler: Option<Arc<dyn ContractHandler>>,
    validator: Arc<dyn SchemaValidator>,
    validate_output: bool,
}

impl ValidatedContract {
    pub fn new(
        contract: Arc<Contract>,
        handler: Option<Arc<dyn ContractHandler>>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        ValidatedContract { contract, handler, validator, validate_output: true }
    }

    /// Disables output validation (input validation always runs).
    pub fn without_output_validation(mut self) -> Self {
        self.validate_output = false;
        self
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub async fn handle(&self, input: JsonValue, auth: AuthInput) -> anyhow::Result<CrudResult> {
        let outcome = self.validator.validate(&self.contract.arguments, &input);
        if outcome.failed() {
            return Ok(CrudResult::error(
                400,
                "Input validation failed",
                outcome.into_errors(),
                input,
            ));
        }

        let Some(handler) = &self.handler else {
            return Ok(CrudResult::error(
                501,
                "Not implemented",
                vec![json!(format!("Handler for {} was not defined", self.contract.name))],
                json!(self.contract.name),
            ));
        };

        let handler_auth = HandlerAuth {
            auth,
            authentication: self.contract.authentication.clone(),
        };
        let result = handler.handle(input, handler_auth).await?;

        if self.validate_output {
            if let CrudResult::Success(success) = &result {
                let outcome = self.validator.validate(&self.contract.returns, &success.result);
                if outcome.failed() {
                    return Ok(CrudResult::error(
                        500,
                        "Unexpected result from function",
                        outcome.into_errors(),
                        success.result.clone(),
                    ));
                }
            }
        }

        Ok(result)
    }
}
