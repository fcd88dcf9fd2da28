pub mod order;
pub mod ticket;

pub use order::{Contact, Order, OrderDetails, OrderItem, OrderStatus, Purchaser};
pub use ticket::{NewTicket, Ticket, TicketStatus, TicketTier};
