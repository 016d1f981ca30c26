// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/data_url.rs - data URL 解码
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::preprocess::PreprocessError;

const DATA_URL_PREFIX: &str = "data:";

/// 解码浏览器 `canvas.toDataURL()` 产生的 `data:image/jpeg;base64,...`
///
/// 不带 `data:` 前缀的字符串按纯 base64 处理；不带 `;base64` 的载荷按百分号编码解码。
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, PreprocessError> {
  let data = data.trim();
  let Some(rest) = data.strip_prefix(DATA_URL_PREFIX) else {
    return decode_base64(data);
  };

  let (header, payload) = rest
    .split_once(',')
    .ok_or_else(|| PreprocessError::invalid("data URL 缺少 ',' 分隔符"))?;

  let mut params = header.split(';');
  let media_type = params.next().unwrap_or_default();
  if !media_type.is_empty() && !media_type.starts_with("image/") {
    return Err(PreprocessError::invalid(format!(
      "data URL 不是图像: {}",
      media_type
    )));
  }

  if params.any(|p| p.eq_ignore_ascii_case("base64")) {
    decode_base64(payload)
  } else {
    Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
  }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, PreprocessError> {
  let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
  STANDARD
    .decode(compact.as_bytes())
    .map_err(|e| PreprocessError::invalid(format!("base64 解码失败: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_base64_data_urls() {
    let bytes = decode_data_url("data:image/png;base64,AAEC/w==").unwrap();
    assert_eq!(bytes, vec![0, 1, 2, 255]);
  }

  #[test]
  fn tolerates_line_breaks_and_bare_base64() {
    assert_eq!(
      decode_data_url("data:image/jpeg;base64,AAEC\r\n/w==").unwrap(),
      vec![0, 1, 2, 255]
    );
    assert_eq!(decode_data_url("AAEC/w==").unwrap(), vec![0, 1, 2, 255]);
  }

  #[test]
  fn decodes_percent_encoded_payloads() {
    let bytes = decode_data_url("data:image/png,%89PNG%0D%0A").unwrap();
    assert_eq!(bytes, b"\x89PNG\r\n".to_vec());
  }

  #[test]
  fn rejects_malformed_urls() {
    assert!(decode_data_url("data:image/png;base64").is_err());
    assert!(decode_data_url("data:text/plain;base64,AAEC").is_err());
    assert!(decode_data_url("data:image/png;base64,@@@").is_err());
  }

  #[test]
  fn empty_payload_decodes_to_nothing() {
    assert!(decode_data_url("data:image/png;base64,").unwrap().is_empty());
  }
}
