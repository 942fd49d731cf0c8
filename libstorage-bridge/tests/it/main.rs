mod bridge;
mod common;
