//! Bootstrap payload - the provisioning data pushed to bound devices.

/// Token delimiter in the SET_DATA payload.
pub const TOKEN_DELIMITER: u8 = 0;

/// Separator between key and value inside an additional-data token.
pub const PAIR_SEPARATOR: u8 = b'\t';

/// Wi-Fi credentials plus arbitrary extra key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapData {
    wifi_ssid: String,
    wifi_password: String,
    additional: Vec<(String, String)>,
}

impl BootstrapData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Wi-Fi network the device should join.
    pub fn set_wifi_data(&mut self, ssid: &str, password: &str) {
        self.wifi_ssid = ssid.to_string();
        self.wifi_password = password.to_string();
    }

    /// Appends one extra key/value pair, handed to the firmware verbatim.
    pub fn add_additional_data(&mut self, key: &str, value: &str) {
        self.additional.push((key.to_string(), value.to_string()));
    }

    /// Encodes the NUL-delimited token list carried by a SET_DATA frame.
    ///
    /// Layout: `ssid \0 password \0 (key \t value \t \0)*`. Each additional
    /// pair occupies one token slot; the trailing delimiter reads back as a
    /// final empty token on the firmware side.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.wifi_ssid.as_bytes());
        buf.push(TOKEN_DELIMITER);
        buf.extend_from_slice(self.wifi_password.as_bytes());
        buf.push(TOKEN_DELIMITER);
        for (key, value) in &self.additional {
            buf.extend_from_slice(key.as_bytes());
            buf.push(PAIR_SEPARATOR);
            buf.extend_from_slice(value.as_bytes());
            buf.push(PAIR_SEPARATOR);
            buf.push(TOKEN_DELIMITER);
        }
        buf
    }
}

/// Splits `data` on `delimiter`, keeping the token after the final
/// delimiter (empty when the data ends with one).
pub fn split_tokens(data: &[u8], delimiter: u8) -> Vec<&[u8]> {
    data.split(|&b| b == delimiter).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_list_matches_the_wire_contract() {
        let mut data = BootstrapData::new();
        data.set_wifi_data("test_wifi_ssid", "test_wifi_pwd");
        data.add_additional_data("testkey", "testvalue");

        let bytes = data.to_bytes();
        let tokens = split_tokens(&bytes, TOKEN_DELIMITER);
        assert_eq!(
            tokens,
            vec![
                b"test_wifi_ssid".as_slice(),
                b"test_wifi_pwd".as_slice(),
                b"testkey\ttestvalue\t".as_slice(),
                b"".as_slice(),
            ]
        );
    }

    #[test]
    fn credentials_only_still_ends_with_a_delimiter() {
        let mut data = BootstrapData::new();
        data.set_wifi_data("ssid", "pwd");

        let bytes = data.to_bytes();
        let tokens = split_tokens(&bytes, TOKEN_DELIMITER);
        assert_eq!(tokens, vec![b"ssid".as_slice(), b"pwd".as_slice(), b"".as_slice()]);
    }

    #[test]
    fn each_additional_pair_takes_one_token_slot() {
        let mut data = BootstrapData::new();
        data.set_wifi_data("s", "p");
        data.add_additional_data("k1", "v1");
        data.add_additional_data("k2", "v2");

        let bytes = data.to_bytes();
        let tokens = split_tokens(&bytes, TOKEN_DELIMITER);
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[2], b"k1\tv1\t");
        assert_eq!(tokens[3], b"k2\tv2\t");
    }
}
