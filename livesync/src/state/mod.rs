//! Local state: the entity model, live lists, and their derived views.

pub mod entities;
pub mod entity;
pub mod feed;
pub mod live_list;
pub mod view;
