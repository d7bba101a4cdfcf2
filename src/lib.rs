#![warn(rust_2018_idioms)]
#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![doc = include_str!("../README.md")]

pub mod application;
mod error;
pub mod framer;
pub mod gateway;
pub mod headers;
mod meta;
pub mod pairs;
pub mod parser;
pub mod request;
pub mod response;

pub use crate::{
    application::{Application, ApplicationHandler, Management, Responder},
    error::ParseError,
    framer::{Framer, IoSink, RecordSink},
    gateway::{Gateway, GatewayHandler},
    headers::Headers,
    meta::{ProtocolStatus, RecordType, Role, Settings},
    parser::{Events, Parser, ParserState},
    request::Request,
    response::Response,
};
