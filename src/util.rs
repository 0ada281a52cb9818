/// 秘密情報をマスキングしてログ出力用の文字列を生成
///
/// 最初の4文字と最後の4文字のみを表示し、中間を***でマスキング。
/// 文字単位で数えるので、マルチバイト文字でも壊れない。
///
/// # Examples
/// ```
/// use wolfy::util::mask_secret;
///
/// let masked = mask_secret("ABCDEF123456GHIJ");
/// assert_eq!(masked, "ABCD***GHIJ");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 8 {
        // 短いものは全体をマスク
        return "***".to_string();
    }

    let prefix: String = secret.chars().take(4).collect();
    let suffix: String = secret.chars().skip(len - 4).collect();
    format!("{}***{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("ABCDEF123456GHIJ"), "ABCD***GHIJ");

        // 短いもの
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret(""), "***");
        assert_eq!(mask_secret("12345678"), "***");

        // 9文字からマスキング開始
        assert_eq!(mask_secret("123456789"), "1234***6789");
    }

    #[test]
    fn test_mask_secret_multibyte() {
        assert_eq!(mask_secret("主播身份码一二三四五"), "主播身份***二三四五");
    }
}
