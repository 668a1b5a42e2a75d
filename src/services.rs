pub mod notification_service;
pub mod reminder_service;
pub mod stage_registry;
pub mod tracking_service;
pub mod whatsapp_service;
