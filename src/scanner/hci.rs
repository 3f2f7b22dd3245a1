//! Raw HCI socket backend.
//!
//! Scans for BLE advertisements directly over a Linux HCI socket, without
//! the BlueZ daemon. Requires CAP_NET_RAW and CAP_NET_ADMIN capabilities or
//! root privileges.

use super::{ScanConfig, ScanError, ScanOutcome};
use crate::channel::ObservationSink;
use crate::filter::NameFilter;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio_util::sync::CancellationToken;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// AD types carrying the advertised local name
const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// Controllers report 127 when no RSSI reading is available.
const RSSI_UNAVAILABLE: i8 = 127;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Scan Parameters command
#[repr(C, packed)]
struct LeSetScanParametersCmd {
    scan_type: u8,
    interval: u16,
    window: u16,
    own_address_type: u8,
    filter_policy: u8,
}

/// LE Set Scan Enable command
#[repr(C, packed)]
struct LeSetScanEnableCmd {
    enable: u8,
    filter_dup: u8,
}

/// View a `repr(C, packed)` command struct as its wire bytes.
fn command_bytes<T>(command: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts(command as *const T as *const u8, mem::size_of::<T>()) }
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.push((opcode & 0xFF) as u8);
    packet.push((opcode >> 8) as u8);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, ScanError> {
    // SOCK_NONBLOCK is required for AsyncFd to work properly
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to create HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), ScanError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to bind HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Restrict the socket to LE meta events
fn set_hci_filter(fd: &OwnedFd) -> Result<(), ScanError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to set HCI filter: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Send an HCI command
fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> Result<(), ScanError> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to send HCI command: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Configure and enable passive LE scanning.
///
/// Duplicate filtering happens in the controller: `filter_dup` is the
/// inverse of `allow_duplicates`.
fn enable_le_scan(fd: &OwnedFd, allow_duplicates: bool) -> Result<(), ScanError> {
    let params = LeSetScanParametersCmd {
        scan_type: LE_SCAN_PASSIVE,
        interval: 0x0010, // 10ms in 0.625ms units
        window: 0x0010,   // 10ms in 0.625ms units
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_ACCEPT_ALL,
    };
    let packet = hci_command_packet(
        OGF_LE_CTL,
        OCF_LE_SET_SCAN_PARAMETERS,
        command_bytes(&params),
    );
    send_hci_command(fd, &packet)?;

    let enable = LeSetScanEnableCmd {
        enable: 0x01,
        filter_dup: u8::from(!allow_duplicates),
    };
    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, command_bytes(&enable));
    send_hci_command(fd, &packet)
}

/// Disable LE scanning; the controller stops emitting advertising reports.
fn disable_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    let disable = LeSetScanEnableCmd {
        enable: 0x00,
        filter_dup: 0x00,
    };
    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, command_bytes(&disable));
    send_hci_command(fd, &packet)
}

/// Extract the advertised local name from a block of AD structures.
fn local_name(ad_data: &[u8]) -> Option<String> {
    let mut offset = 0;
    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        if ad_type == AD_TYPE_COMPLETE_LOCAL_NAME || ad_type == AD_TYPE_SHORTENED_LOCAL_NAME {
            let bytes = &ad_data[offset + 2..offset + 1 + len];
            return String::from_utf8(bytes.to_vec())
                .ok()
                .filter(|name| !name.is_empty());
        }

        offset += 1 + len;
    }
    None
}

/// Parse an LE advertising report into its advertised name and RSSI.
///
/// Reports without a local name, with an unavailable RSSI, or too short to
/// carry one report are skipped.
fn parse_advertising_report(packet: &[u8]) -> Option<(String, i16)> {
    if packet.len() < 12
        || packet[0] != HCI_EVENT_PKT
        || packet[1] != EVT_LE_META_EVENT
        || packet[3] != EVT_LE_ADVERTISING_REPORT
    {
        return None;
    }

    // Skip HCI header (packet type + event code + param len + subevent)
    let report = &packet[4..];

    // Number of reports, then per report: event_type(1) + addr_type(1) +
    // addr(6) + data_len(1) + data(N) + rssi(1). We process the first.
    if report[0] == 0 || report.len() < 10 {
        return None;
    }

    let data_len = report[9] as usize;
    if report.len() < 11 + data_len {
        return None;
    }

    let ad_data = &report[10..10 + data_len];
    let rssi = report[10 + data_len] as i8;
    if rssi == RSSI_UNAVAILABLE {
        return None;
    }

    local_name(ad_data).map(|name| (name, i16::from(rssi)))
}

/// Scan for advertisements over a raw HCI socket.
///
/// One socket receives advertising events, a second carries the scan
/// commands. The controller is told to stop scanning before the channel
/// closes, so no report can arrive after end-of-stream.
pub async fn scan(
    config: ScanConfig,
    filter: NameFilter,
    sink: ObservationSink,
    cancel: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    let fd = open_hci_socket()?;
    bind_hci_socket(&fd, 0)?; // Bind to hci0 to receive advertising events
    set_hci_filter(&fd)?;

    let cmd_fd = open_hci_socket()?;
    bind_hci_socket(&cmd_fd, 0)?;
    enable_le_scan(&cmd_fd, config.allow_duplicates)?;

    let async_fd = AsyncFd::new(fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    tokio::pin! {
        let deadline = super::deadline(config.duration);
    }

    let mut buf = [0u8; 258]; // Max HCI event size

    let outcome = loop {
        tokio::select! {
            () = cancel.cancelled() => break ScanOutcome::Cancelled,
            () = &mut deadline => break ScanOutcome::DeadlineExceeded,
            readable = async_fd.readable() => {
                let mut guard = readable
                    .map_err(|e| ScanError::Bluetooth(format!("HCI socket failed: {e}")))?;

                // Drain all available packets before waiting again
                loop {
                    let n = match guard.try_io(|inner| {
                        let ret = unsafe {
                            libc::read(
                                inner.as_raw_fd(),
                                buf.as_mut_ptr() as *mut c_void,
                                buf.len(),
                            )
                        };
                        if ret < 0 {
                            Err(io::Error::last_os_error())
                        } else {
                            Ok(ret as usize)
                        }
                    }) {
                        Ok(Ok(n)) if n > 0 => n,
                        Ok(Ok(_)) => break,  // EOF or empty read
                        Ok(Err(_)) => break, // Read error
                        Err(_) => break,     // WouldBlock - no more data
                    };

                    if let Some((name, rssi)) = parse_advertising_report(&buf[..n])
                        && let Some(observation) = filter.observe(&name, rssi)
                    {
                        sink.submit(observation).await;
                    }
                }
            }
        }
    };

    let _ = disable_le_scan(&cmd_fd);
    sink.close();

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble an advertising-report packet around the given AD structures.
    fn advertising_packet(ad_data: &[u8], rssi: u8) -> Vec<u8> {
        let mut packet = vec![HCI_EVENT_PKT, EVT_LE_META_EVENT, 0x00, EVT_LE_ADVERTISING_REPORT];
        packet.push(1); // num_reports
        packet.push(0); // event type
        packet.push(0); // address type
        packet.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        packet.push(ad_data.len() as u8);
        packet.extend_from_slice(ad_data);
        packet.push(rssi);
        packet[2] = (packet.len() - 3) as u8; // parameter length
        packet
    }

    fn name_ad(ad_type: u8, name: &str) -> Vec<u8> {
        let mut ad = vec![(name.len() + 1) as u8, ad_type];
        ad.extend_from_slice(name.as_bytes());
        ad
    }

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    #[test]
    fn scan_enable_derives_filter_dup_from_allow_duplicates() {
        let enable = LeSetScanEnableCmd {
            enable: 0x01,
            filter_dup: u8::from(!true),
        };
        assert_eq!(command_bytes(&enable), &[0x01, 0x00]);

        let filtered = LeSetScanEnableCmd {
            enable: 0x01,
            filter_dup: u8::from(!false),
        };
        assert_eq!(command_bytes(&filtered), &[0x01, 0x01]);
    }

    #[test]
    fn parses_complete_local_name_and_rssi() {
        let packet = advertising_packet(&name_ad(AD_TYPE_COMPLETE_LOCAL_NAME, "CoSensor"), 0xD8);
        assert_eq!(
            parse_advertising_report(&packet),
            Some(("CoSensor".to_string(), -40))
        );
    }

    #[test]
    fn parses_shortened_local_name() {
        let packet = advertising_packet(&name_ad(AD_TYPE_SHORTENED_LOCAL_NAME, "CoS"), 0xC4);
        assert_eq!(
            parse_advertising_report(&packet),
            Some(("CoS".to_string(), -60))
        );
    }

    #[test]
    fn name_is_found_after_other_ad_structures() {
        let mut ad_data = vec![0x02, 0x01, 0x06]; // flags
        ad_data.extend_from_slice(&name_ad(AD_TYPE_COMPLETE_LOCAL_NAME, "CoSensor"));
        let packet = advertising_packet(&ad_data, 0xD8);
        assert_eq!(
            parse_advertising_report(&packet),
            Some(("CoSensor".to_string(), -40))
        );
    }

    #[test]
    fn skips_reports_without_a_name() {
        let packet = advertising_packet(&[0x02, 0x01, 0x06], 0xD8);
        assert_eq!(parse_advertising_report(&packet), None);
    }

    #[test]
    fn skips_unavailable_rssi() {
        let packet = advertising_packet(&name_ad(AD_TYPE_COMPLETE_LOCAL_NAME, "CoSensor"), 127);
        assert_eq!(parse_advertising_report(&packet), None);
    }

    #[test]
    fn rejects_truncated_packets() {
        let packet = advertising_packet(&name_ad(AD_TYPE_COMPLETE_LOCAL_NAME, "CoSensor"), 0xD8);
        assert_eq!(parse_advertising_report(&packet[..packet.len() - 2]), None);
        assert_eq!(parse_advertising_report(&[0x04, 0x3E]), None);
        assert_eq!(parse_advertising_report(&[]), None);
    }

    #[test]
    fn rejects_non_advertising_events() {
        let mut packet = advertising_packet(&name_ad(AD_TYPE_COMPLETE_LOCAL_NAME, "CoSensor"), 0xD8);
        packet[3] = 0x01; // different LE meta sub-event
        assert_eq!(parse_advertising_report(&packet), None);
    }
}
