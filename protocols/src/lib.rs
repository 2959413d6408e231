//! Wire and text formats spoken with the outside world: DNS messages sent to a
//! resolver and the output nmap writes back.

pub mod dns;
pub mod nmap;
