// BitBox HWW Driver
// Written in 2026 by
//   The bbhww developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! The public relay server, reached over HTTPS

use serde::Deserialize;

use super::RelayServer;
use crate::constants::v1::relay::{CMD_PULL, CMD_PUSH, DEFAULT_SERVER, DEVICE_TYPE};
use crate::Error;

#[derive(Debug, Deserialize)]
struct RelayMessage {
    #[allow(dead_code)]
    id: serde_json::Value,
    #[allow(dead_code)]
    age: serde_json::Value,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    status: String,
    #[serde(default)]
    data: Option<Vec<RelayMessage>>,
    #[serde(default)]
    error: Option<String>,
}

impl RelayResponse {
    fn check(self) -> Result<Self, Error> {
        if self.status == "nok" {
            let error = self.error.unwrap_or_else(|| "unknown error".into());
            return Err(Error::Relay(error));
        }
        Ok(self)
    }
}

/// A relay server speaking the form-encoded HTTP protocol
#[derive(Debug)]
pub struct HttpServer {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpServer {
    /// A relay at `url`
    pub fn new<S: Into<String>>(url: S) -> HttpServer {
        HttpServer {
            url: url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn request(&self, command: &str, channel_id: &str, payload: &str) -> Result<RelayResponse, Error> {
        let body = self
            .client
            .post(&self.url)
            .form(&[
                ("c", command),
                ("uuid", channel_id),
                ("dt", DEVICE_TYPE),
                ("pl", payload),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        let response: RelayResponse = serde_json::from_str(&body)?;
        response.check()
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        HttpServer::new(DEFAULT_SERVER)
    }
}

impl RelayServer for HttpServer {
    fn push(&self, channel_id: &str, payload: &str) -> Result<(), Error> {
        log::trace!("relay push on {}", channel_id);
        self.request(CMD_PUSH, channel_id, payload)?;
        Ok(())
    }

    fn pull(&self, channel_id: &str) -> Result<Option<String>, Error> {
        let response = self.request(CMD_PULL, channel_id, "")?;
        Ok(response
            .data
            .and_then(|data| data.into_iter().next())
            .map(|msg| msg.payload))
    }
}
