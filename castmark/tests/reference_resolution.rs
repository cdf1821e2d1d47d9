/// Resolution tests for pasted cast references
///
/// These cover every input shape the import form accepts:
/// - Full, mid-length and shortened hashes
/// - Client URLs in the `/~/cast/HASH`, `/~/HASH` and `/username/HASH` shapes
/// - Decorated input (whitespace, quotes, tracking parameters)
/// - Rejections that must stay distinguishable for user-facing messages

#[cfg(test)]
mod tests {
    use castmark::{
        is_plausible_reference, resolve_reference, KnownDomains, ResolutionError,
        Resolver,
    };

    fn full_hash() -> String {
        format!("0x{}", "a".repeat(64))
    }

    /// Same input always yields the same output
    #[test]
    fn test_resolution_is_deterministic() {
        let inputs = [
            full_hash(),
            "0x5cd3f740".to_string(),
            "https://warpcast.com/~/cast/0x5cd3f740?embed=1".to_string(),
            "not a url or hash".to_string(),
        ];

        for input in &inputs {
            assert_eq!(
                resolve_reference(input),
                resolve_reference(input),
                "resolution of {:?} should be stable",
                input
            );
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let plain = resolve_reference("0xABC12345").unwrap();
        let padded = resolve_reference(" \t0xABC12345 \n").unwrap();
        assert_eq!(plain.canonical_id, padded.canonical_id);
    }

    #[test]
    fn test_quotes_are_stripped() {
        let unquoted = resolve_reference("0x1234567890123456").unwrap();

        for quoted in ["\"0x1234567890123456\"", "'0x1234567890123456'"] {
            assert_eq!(resolve_reference(quoted).unwrap(), unquoted);
            assert!(is_plausible_reference(quoted));
        }
    }

    /// Hex case is accepted either way and preserved in the output
    #[test]
    fn test_hex_case_is_preserved() {
        let upper = format!("0x{}", "ABCDEF12".repeat(8));
        let lower = upper.to_lowercase();

        assert!(is_plausible_reference(&upper));
        assert!(is_plausible_reference(&lower));
        assert_eq!(resolve_reference(&upper).unwrap().canonical_id, upper);
        assert_eq!(resolve_reference(&lower).unwrap().canonical_id, lower);
        assert!(resolve_reference(&upper).unwrap().matches_hash(&lower));
    }

    #[test]
    fn test_full_hash() {
        let reference = resolve_reference(&full_hash()).unwrap();
        assert_eq!(reference.canonical_id, full_hash());
        assert_eq!(reference.canonical_url, None);
        assert!(!reference.is_shortened);
    }

    #[test]
    fn test_mid_length_hash() {
        let hash = format!("0x{}", "b".repeat(40));
        let reference = resolve_reference(&hash).unwrap();
        assert_eq!(reference.canonical_id, hash);
        assert_eq!(reference.canonical_url, None);
        assert!(!reference.is_shortened);
    }

    #[test]
    fn test_shortened_hash_is_flagged() {
        let reference = resolve_reference("0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
        assert!(reference.is_shortened);
        assert_eq!(reference.canonical_url, None);
    }

    #[test]
    fn test_hash_lengths_outside_known_shapes() {
        // 7, 17 and 63 digits match none of the accepted hash shapes
        for digits in [7, 17, 63] {
            let hash = format!("0x{}", "c".repeat(digits));
            assert!(!is_plausible_reference(&hash), "{} digits", digits);
            assert_eq!(
                resolve_reference(&hash),
                Err(ResolutionError::UnsupportedFormat),
                "{} digits",
                digits
            );
        }
    }

    #[test]
    fn test_tilde_cast_url() {
        let reference =
            resolve_reference("https://warpcast.com/~/cast/0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
        assert_eq!(
            reference.canonical_url.as_deref(),
            Some("https://warpcast.com/~/cast/0x5cd3f740")
        );
        assert!(reference.is_shortened);
    }

    /// Query parameters and fragments are not part of the canonical URL
    #[test]
    fn test_tracking_parameters_are_stripped() {
        let reference =
            resolve_reference("https://warpcast.com/~/cast/0x5cd3f740?embed=1#replies")
                .unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
        assert_eq!(
            reference.canonical_url.as_deref(),
            Some("https://warpcast.com/~/cast/0x5cd3f740")
        );
    }

    #[test]
    fn test_username_url() {
        let reference =
            resolve_reference("https://warpcast.com/overproticol/0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
        assert_eq!(
            reference.canonical_url.as_deref(),
            Some("https://warpcast.com/overproticol/0x5cd3f740")
        );
    }

    #[test]
    fn test_tilde_url() {
        let reference = resolve_reference("https://warpcast.com/~/0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
    }

    #[test]
    fn test_full_hash_in_url_is_not_shortened() {
        let url = format!("https://warpcast.com/dwr/{}", full_hash());
        let reference = resolve_reference(&url).unwrap();
        assert_eq!(reference.canonical_id, full_hash());
        assert!(!reference.is_shortened);
    }

    #[test]
    fn test_third_party_clients() {
        for url in [
            "https://far.quest/dwr/0x5cd3f740",
            "https://fcast.me/dwr/0x5cd3f740",
            "https://farcaster.xyz/dwr/0x5cd3f740",
            "https://www.warpcast.com/dwr/0x5cd3f740",
        ] {
            assert!(is_plausible_reference(url), "{}", url);
            assert_eq!(resolve_reference(url).unwrap().canonical_id, "0x5cd3f740", "{}", url);
        }
    }

    /// A second segment that isn't a hash falls through to the path scan
    #[test]
    fn test_hash_found_by_path_scan() {
        let reference =
            resolve_reference("https://far.quest/dwr/casts/0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
    }

    #[test]
    fn test_unprefixed_hash_in_url() {
        let digits = "d".repeat(40);
        let reference =
            resolve_reference(&format!("https://fcast.me/dwr/casts/{}", digits)).unwrap();
        assert_eq!(reference.canonical_id, format!("0x{}", digits));
        assert!(reference.is_shortened);
    }

    /// Every resolved id is `0x` plus 8 to 64 hex digits
    #[test]
    fn test_url_hash_length_bounds() {
        assert_eq!(
            resolve_reference("https://warpcast.com/dwr/0x1"),
            Err(ResolutionError::UnsupportedFormat)
        );
        assert_eq!(
            resolve_reference("https://warpcast.com/~/cast/0x1234567"),
            Err(ResolutionError::UnsupportedFormat)
        );

        let too_long = format!("https://warpcast.com/dwr/0x{}", "a".repeat(70));
        assert_eq!(
            resolve_reference(&too_long),
            Err(ResolutionError::UnsupportedFormat)
        );

        // an out-of-range segment doesn't hide a valid one later in the path
        let reference =
            resolve_reference("https://warpcast.com/dwr/0x1/0x5cd3f740").unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");
        assert!(reference.is_shortened);
    }

    #[test]
    fn test_unsupported_domain_is_rejected() {
        let input = "https://example.com/foo/0xdeadbeef";
        assert!(!is_plausible_reference(input));
        assert_eq!(
            resolve_reference(input),
            Err(ResolutionError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_lookalike_domain_is_rejected() {
        let input = "https://notwarpcast.com/dwr/0x5cd3f740";
        assert!(!is_plausible_reference(input));
        assert_eq!(
            resolve_reference(input),
            Err(ResolutionError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(!is_plausible_reference("not a url or hash"));
        assert_eq!(
            resolve_reference("not a url or hash"),
            Err(ResolutionError::UnsupportedFormat)
        );
        assert_eq!(resolve_reference(""), Err(ResolutionError::UnsupportedFormat));
        assert_eq!(resolve_reference("   "), Err(ResolutionError::UnsupportedFormat));
    }

    /// `[` is legal in a URL path, so this parses and simply has no hash
    #[test]
    fn test_bracket_path_is_unsupported() {
        let input = "https://warpcast.com/[invalid";
        assert!(is_plausible_reference(input));
        assert_eq!(
            resolve_reference(input),
            Err(ResolutionError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_unparseable_urls_are_malformed() {
        for input in [
            "https://warpcast.com:99999/~/cast/0x5cd3f740",
            "warpcast.com/~/cast/0x5cd3f740",
            "https://[warpcast.com/~/cast/0x5cd3f740",
        ] {
            assert!(!is_plausible_reference(input), "{}", input);
            assert_eq!(
                resolve_reference(input),
                Err(ResolutionError::MalformedUrl),
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_non_http_schemes_are_unsupported() {
        let input = "ftp://warpcast.com/dwr/0x5cd3f740";
        assert!(!is_plausible_reference(input));
        assert_eq!(
            resolve_reference(input),
            Err(ResolutionError::UnsupportedFormat)
        );
    }

    /// Plausibility is a pre-filter: some plausible inputs still fail
    #[test]
    fn test_plausible_but_unresolvable() {
        let bare_hash = "e".repeat(64);

        for input in [
            "https://warpcast.com/dwr",
            "https://warpcast.com/~/settings",
            bare_hash.as_str(),
        ] {
            assert!(is_plausible_reference(input), "{}", input);
            assert!(resolve_reference(input).is_err(), "{}", input);
        }
    }

    /// A root URL has no path worth checking
    #[test]
    fn test_root_url_is_implausible() {
        assert!(!is_plausible_reference("https://warpcast.com/"));
        assert!(!is_plausible_reference("https://warpcast.com"));
        assert!(resolve_reference("https://warpcast.com/").is_err());
    }

    /// Whenever the pre-filter rejects an input, resolution fails too
    #[test]
    fn test_implausible_never_resolves() {
        let inputs = [
            "",
            "0x",
            "0x1234567",
            "hello",
            "https://example.com/foo/0xdeadbeef",
            "https://warpcast.com/",
            "warpcast.com/~/cast/0x5cd3f740",
            "https://warpcast.com:99999/x/0x5cd3f740",
            "mailto:dwr@warpcast.com",
            "0xZZZZZZZZ",
        ];

        for input in inputs {
            if !is_plausible_reference(input) {
                assert!(resolve_reference(input).is_err(), "{:?} resolved", input);
            }
        }
    }

    #[test]
    fn test_configured_domains_replace_defaults() {
        let resolver = Resolver::new("supercast.xyz".parse::<KnownDomains>().unwrap());

        let reference = resolver
            .resolve_reference("https://supercast.xyz/dwr/0x5cd3f740")
            .unwrap();
        assert_eq!(reference.canonical_id, "0x5cd3f740");

        assert!(!resolver.is_plausible_reference("https://warpcast.com/dwr/0x5cd3f740"));
        assert_eq!(
            resolver.resolve_reference("https://warpcast.com/dwr/0x5cd3f740"),
            Err(ResolutionError::UnsupportedFormat)
        );
        // hashes don't depend on the domain list
        assert!(resolver.resolve_reference("0x5cd3f740").is_ok());
    }
}
