use rand::Rng;

pub mod bytes;
pub mod checksum;
pub mod dns;
pub mod packet_utils;

pub fn generate_u16() -> u16 {
    rand::thread_rng().gen()
}
