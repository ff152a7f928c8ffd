//! ESP8266 modem driver: joins the wireless network and reaches the storage service over AT
//! commands.
//!
//! Every command is answered with a final line containing `OK`, `ERROR`, `FAIL` or `CLOSED`. A
//! storage call opens a TCP connection, sends one HTTP request, reads until the response body is
//! complete and closes the connection again. A modem which stops answering is given up on after
//! [`IDLE_POLLS`] empty polls of the UART.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use heapless::Vec as FixedVec;

use super::Uart;
use crate::debug;
use crate::network::{response_value, Network, StorageRequest};

/// Empty receive polls after which a reply is considered lost
pub const IDLE_POLLS: u32 = 5_000_000;

/// Attempts made at each step of joining a network
const JOIN_ATTEMPTS: usize = 5;

/// Longest reply line kept for matching; the rest of a longer line is dropped
const LINE_SZ: usize = 128;

/// Largest HTTP response kept
const RESPONSE_SZ: usize = 2048;

/// The modem on the WiFi UART
#[derive(Debug)]
pub struct Modem {
    uart: Uart,
    host: &'static str,
}

impl Modem {
    /// Wraps the modem's UART; `host` is the storage service every request goes to
    pub fn new(uart: Uart, host: &'static str) -> Self {
        Modem { uart, host }
    }

    /// Sends one AT command and waits for its final reply line
    fn command(&mut self, cmd: &str) -> bool {
        self.uart.write(cmd.as_bytes());
        self.uart.write(b"\r\n");

        let mut line: FixedVec<u8, LINE_SZ> = FixedVec::new();
        let mut idle = 0;
        loop {
            let b = match self.uart.readb() {
                Some(b) => b,
                None => {
                    idle += 1;
                    if idle > IDLE_POLLS {
                        debug!("Modem stopped answering {}", cmd);
                        return false;
                    }
                    continue;
                }
            };
            idle = 0;

            if b != b'\n' {
                let _ignored = line.push(b);
                continue;
            }
            if contains(&line, b"OK") {
                return true;
            }
            if contains(&line, b"ERROR") || contains(&line, b"FAIL") {
                return false;
            }
            if contains(&line, b"CLOSED") {
                self.uart.flush();
                return false;
            }
            line.clear();
        }
    }

    /// Reads an HTTP response up to the end of its JSON body
    fn read_response(&mut self) -> Vec<u8> {
        let mut response = Vec::new();
        let mut in_body = false;
        let mut idle = 0;
        while response.len() < RESPONSE_SZ && idle <= IDLE_POLLS {
            let b = match self.uart.readb() {
                Some(b) => b,
                None => {
                    idle += 1;
                    continue;
                }
            };
            idle = 0;
            response.push(b);

            if !in_body {
                in_body = response.ends_with(b"\r\n\r\n");
            } else if b == b'}' {
                break;
            }
        }
        response
    }

    /// Performs one storage call; the first value of the response body
    fn exchange(&mut self, request: &StorageRequest<'_>) -> Option<String> {
        let http = request.to_http(self.host);
        if !self.command(&format!("AT+CIPSTART=\"TCP\",\"{}\",80,7200", self.host)) {
            debug!("Couldn't connect to {}", self.host);
            return None;
        }

        let answer = if self.command(&format!("AT+CIPSEND={}", http.len())) {
            self.uart.write(http.as_bytes());
            let response = self.read_response();
            response_value(&response)
        } else {
            None
        };

        let _ignored = self.command("AT+CIPCLOSE");
        answer
    }
}

impl Network for Modem {
    fn join_network(&mut self, ssid: &str, password: &str) -> bool {
        if !(0..JOIN_ATTEMPTS).any(|_| self.command("AT+CWMODE=3")) {
            return false;
        }
        let join = format!("AT+CWJAP=\"{}\",\"{}\"", ssid, password);
        (0..JOIN_ATTEMPTS).any(|_| self.command(&join))
    }

    fn upload_block(&mut self, file_id: &str, block_index: usize, hex: &str) -> bool {
        let request = StorageRequest::StoreBlock {
            file_id,
            block_index,
            hex,
        };
        self.exchange(&request).as_deref() == Some("1")
    }

    fn download_block(&mut self, file_id: &str, block_index: usize) -> Option<String> {
        self.exchange(&StorageRequest::FetchBlock {
            file_id,
            block_index,
        })
    }

    fn file_block_count(&mut self, file_id: &str) -> Option<usize> {
        self.exchange(&StorageRequest::BlockCount { file_id })?
            .parse()
            .ok()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
