#[macro_use]
extern crate getset;

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

#[macro_use]
extern crate enum_primitive_derive;
extern crate num_traits;
extern crate byteorder;
#[macro_use]
extern crate bitflags;

extern crate libc;
extern crate nix;
extern crate sha1;
extern crate uuid;
extern crate clap;

pub mod cfg;
pub mod codec;
pub mod connection;
pub mod ctl;
pub mod datapath_id;
pub mod ds;
pub mod err;
pub mod event;
pub mod handshake;
pub mod poll;
pub mod registry;
pub mod scheduler;
pub mod signals;
pub mod switch_mgr;
pub mod timer;
