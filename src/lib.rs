pub mod access;
pub mod admin;
pub mod calendar;
pub mod catalog;
pub mod community;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod home_board;
pub mod invite;
pub mod model;
pub mod payments;
pub mod pricing;
pub mod rooms;
pub mod schedule;
pub mod seed;
pub mod timestamp;
