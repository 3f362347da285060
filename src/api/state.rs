use crate::{auth::TokenIssuer, commands::SharedLogic};

#[derive(Clone)]
pub struct AppState {
    pub logic: SharedLogic,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(logic: SharedLogic, tokens: TokenIssuer) -> Self {
        Self { logic, tokens }
    }
}
