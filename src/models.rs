pub mod crm;
pub mod finance;
pub mod notification;
pub mod reminders;
pub mod tasks;
pub mod tracking;
pub mod whatsapp;
