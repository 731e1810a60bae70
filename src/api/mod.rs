pub mod config_dto;
pub mod event_dto;
pub mod resource_dto;
