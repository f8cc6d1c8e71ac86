//! Object-safe facade over [`crate::Bus`], so higher layers (`xc2-device`, `xc2-virtual`)
//! can hold a bus without being generic over its [`crate::bus::Connector`].

use std::time::Duration;

use xc2_protocol::consts::BusStatus;

use crate::bus::{Bus, Connector};
use crate::error::BusError;
use crate::selector::{Protocol, WireFrame};

#[async_trait::async_trait]
pub trait BusPort: Send {
    async fn connect(&mut self) -> Result<(), BusError>;
    async fn request_response(&mut self, req: WireFrame, timeout: Option<Duration>) -> Result<WireFrame, BusError>;
    async fn broadcast(&mut self, pkt: WireFrame, timeout: Option<Duration>) -> Result<Vec<WireFrame>, BusError>;
    async fn unicast(&mut self, pkt: WireFrame, req_response: bool, timeout: Option<Duration>) -> Result<Option<WireFrame>, BusError>;
    async fn command(
        &mut self,
        my_addr: u16,
        device_addr: u16,
        cmd: u8,
        data: &[u8],
        req_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BusError>;
    async fn sys_command(
        &mut self,
        my_addr: u16,
        device_addr: u16,
        subcommand: u8,
        value: Option<&[u8]>,
        req_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BusError>;
    async fn read_event(&mut self, short_timeout: Duration) -> Option<WireFrame>;
    fn status(&self) -> BusStatus;
    fn bus_name(&self) -> String;
    fn change_protocol(&mut self, protocol: Protocol);
}

#[async_trait::async_trait]
impl<C: Connector + 'static> BusPort for Bus<C> {
    async fn connect(&mut self) -> Result<(), BusError> {
        Bus::connect(self).await
    }

    async fn request_response(&mut self, req: WireFrame, timeout: Option<Duration>) -> Result<WireFrame, BusError> {
        Bus::request_response(self, req, timeout).await
    }

    async fn broadcast(&mut self, pkt: WireFrame, timeout: Option<Duration>) -> Result<Vec<WireFrame>, BusError> {
        Bus::broadcast(self, pkt, timeout).await
    }

    async fn unicast(&mut self, pkt: WireFrame, req_response: bool, timeout: Option<Duration>) -> Result<Option<WireFrame>, BusError> {
        Bus::unicast(self, pkt, req_response, timeout).await
    }

    async fn command(
        &mut self,
        my_addr: u16,
        device_addr: u16,
        cmd: u8,
        data: &[u8],
        req_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BusError> {
        Bus::command(self, my_addr, device_addr, cmd, data, req_response, timeout).await
    }

    async fn sys_command(
        &mut self,
        my_addr: u16,
        device_addr: u16,
        subcommand: u8,
        value: Option<&[u8]>,
        req_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BusError> {
        Bus::sys_command(self, my_addr, device_addr, subcommand, value, req_response, timeout).await
    }

    async fn read_event(&mut self, short_timeout: Duration) -> Option<WireFrame> {
        Bus::read_event(self, short_timeout).await
    }

    fn status(&self) -> BusStatus {
        Bus::status(self)
    }

    fn bus_name(&self) -> String {
        Bus::bus_name(self)
    }

    fn change_protocol(&mut self, protocol: Protocol) {
        Bus::change_protocol(self, protocol)
    }
}
