pub mod customer_session;
pub mod dining_table;
pub mod inventory_log;
pub mod menu_item;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod order_sequence;
pub mod payment;
