use std::sync::Arc;

use crate::orders::OrderService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
}

impl AppState {
    pub fn new(service: OrderService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
