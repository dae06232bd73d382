use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::probe::ProbeError;
use crate::probe::task::{EchoProbeTask, IcmpProbeTask, ProbeTask, UdpProbeTask};
use crate::socket::SocketFactory;

/// Produces one [`ProbeTask`] per attempt, each with freshly opened sockets.
pub trait ProbeTaskGenerator: Send {
    fn generate_probe_task(
        &mut self,
        destination_address: Ipv4Addr,
    ) -> Result<Box<dyn ProbeTask>, ProbeError>;
}

pub struct EchoProbeTaskGenerator {
    identifier: u16,
    sequence_number: u16,
    socket_factory: Arc<dyn SocketFactory>,
}

impl EchoProbeTaskGenerator {
    pub fn new(identifier: u16, socket_factory: Arc<dyn SocketFactory>) -> Self {
        Self {
            identifier,
            sequence_number: 0,
            socket_factory,
        }
    }
}

impl ProbeTaskGenerator for EchoProbeTaskGenerator {
    fn generate_probe_task(
        &mut self,
        destination_address: Ipv4Addr,
    ) -> Result<Box<dyn ProbeTask>, ProbeError> {
        let socket = self.socket_factory.icmp_socket().map_err(ProbeError::SocketCreation)?;
        let task = EchoProbeTask::new(socket, destination_address, self.identifier, self.sequence_number);
        self.sequence_number = self.sequence_number.wrapping_add(1);
        Ok(Box::new(task))
    }
}

pub struct IcmpProbeTaskGenerator {
    icmp_id: u16,
    icmp_sqn: u16,
    socket_factory: Arc<dyn SocketFactory>,
}

impl IcmpProbeTaskGenerator {
    pub fn new(icmp_id: u16, isn: u16, socket_factory: Arc<dyn SocketFactory>) -> Self {
        Self {
            icmp_id,
            icmp_sqn: isn,
            socket_factory,
        }
    }
}

impl ProbeTaskGenerator for IcmpProbeTaskGenerator {
    fn generate_probe_task(
        &mut self,
        destination_address: Ipv4Addr,
    ) -> Result<Box<dyn ProbeTask>, ProbeError> {
        let send_socket = self.socket_factory.icmp_socket().map_err(ProbeError::SocketCreation)?;
        let recv_socket = self.socket_factory.icmp_socket().map_err(ProbeError::SocketCreation)?;
        let task = IcmpProbeTask::new(send_socket, recv_socket, destination_address, self.icmp_id, self.icmp_sqn);
        self.icmp_sqn = self.icmp_sqn.wrapping_add(1);
        Ok(Box::new(task))
    }
}

pub struct UdpProbeTaskGenerator {
    destination_port: u16,
    socket_factory: Arc<dyn SocketFactory>,
}

impl UdpProbeTaskGenerator {
    pub fn new(initial_destination_port: u16, socket_factory: Arc<dyn SocketFactory>) -> Self {
        Self {
            destination_port: initial_destination_port,
            socket_factory,
        }
    }
}

impl ProbeTaskGenerator for UdpProbeTaskGenerator {
    fn generate_probe_task(
        &mut self,
        destination_address: Ipv4Addr,
    ) -> Result<Box<dyn ProbeTask>, ProbeError> {
        let recv_socket = self.socket_factory.icmp_socket().map_err(ProbeError::SocketCreation)?;
        let send_socket = self.socket_factory.udp_socket().map_err(ProbeError::SocketCreation)?;
        let task = UdpProbeTask::new(send_socket, recv_socket, destination_address, self.destination_port);
        self.destination_port = self.destination_port.wrapping_add(1);
        Ok(Box::new(task))
    }
}
