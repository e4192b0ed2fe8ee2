pub mod auth;
pub mod contractors;
pub mod form;
pub mod health;
pub mod sites;
pub mod users;
pub mod work_logs;
pub mod work_orders;
