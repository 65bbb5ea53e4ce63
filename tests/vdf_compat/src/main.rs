fn main() {
    println!("Run `cargo test -p vdf-compat` to check the Steam file fixtures.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Once;

    use jackify_steam::compat_tool::splice_compat_mapping;
    use jackify_steam::users::resolve_active_user_in;
    use jackify_steam::{
        CompatToolMapper, DuplicatePolicy, Paths, SetupOutcome, ShortcutRequest, ShortcutStore,
        SteamSetup, TextSpliceMapper, decode_binary, decode_text, encode_binary,
        most_recent_user, to_steamid3,
    };

    const ACTIVE_STEAMID3: u64 = 52_079_950;

    fn init_tracing() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn fixture_text(name: &str) -> String {
        String::from_utf8(load_fixture(name)).unwrap()
    }

    /// Lays the fixtures out as a Steam installation under `root`, with a
    /// second library at `sdcard`.
    fn install(root: &Path, sdcard: &Path) {
        let config = root.join("config");
        fs::create_dir_all(&config).unwrap();
        fs::create_dir_all(root.join("steamapps")).unwrap();
        fs::create_dir_all(sdcard.join("steamapps")).unwrap();
        fs::write(config.join("loginusers.vdf"), load_fixture("loginusers.vdf")).unwrap();
        fs::write(config.join("config.vdf"), load_fixture("config.vdf")).unwrap();

        let libraries = fixture_text("libraryfolders.vdf")
            .replace("STEAM_ROOT", &root.display().to_string())
            .replace("SDCARD_ROOT", &sdcard.display().to_string());
        fs::write(root.join("steamapps/libraryfolders.vdf"), libraries).unwrap();

        let user_config = root.join(format!("userdata/{ACTIVE_STEAMID3}/config"));
        fs::create_dir_all(&user_config).unwrap();
        fs::write(user_config.join("shortcuts.vdf"), load_fixture("shortcuts.vdf")).unwrap();
    }

    #[test]
    fn shortcuts_fixture_reencodes_byte_for_byte() {
        let bytes = load_fixture("shortcuts.vdf");
        let root = decode_binary(&bytes).unwrap();
        assert_eq!(encode_binary(&root), bytes);

        let shortcuts = root.get_object("shortcuts").unwrap();
        let first = shortcuts.get_object("0").unwrap();
        assert_eq!(first.get_str("AppName"), Some("Skyrim Modlist"));
        assert_eq!(first.get("appid").and_then(|v| v.as_i32()), Some(-123_456_789));
        assert_eq!(
            first.get_object("tags").and_then(|t| t.get_str("0")),
            Some("Jackify")
        );
    }

    #[test]
    fn store_reads_fixture_shortcuts() {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shortcuts.vdf");
        fs::write(&path, load_fixture("shortcuts.vdf")).unwrap();

        let store = ShortcutStore::new(&path);
        let listed = store.list_shortcuts().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed["Skyrim Modlist"], "123456789");
        assert_eq!(listed["Heroic"], "2000000000");

        let found = store.find_by_executable("ModOrganizer.exe").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unsigned_app_id(), (-123_456_789i32) as u32);
    }

    #[test]
    fn loginusers_fixture_picks_most_recent() {
        let root = decode_text(&fixture_text("loginusers.vdf")).unwrap();
        let steamid64 = most_recent_user(&root).unwrap();
        assert_eq!(steamid64, "76561198012345678");
        assert_eq!(to_steamid3(&steamid64).unwrap(), ACTIVE_STEAMID3);
    }

    #[test]
    fn config_fixture_splice_touches_only_mapping() {
        let before = fixture_text("config.vdf");
        let after = splice_compat_mapping(
            before.as_bytes(),
            4_000_000_000,
            "proton_experimental",
            DuplicatePolicy::Replace,
        )
        .unwrap();

        let close = "\t\t\t\t}\n\t\t\t\t\"ShaderCacheManager\"";
        let entry = "\t\t\t\t\t\"4000000000\"\n\t\t\t\t\t{\n\t\t\t\t\t\t\"name\"\t\t\"proton_experimental\"\n\t\t\t\t\t\t\"config\"\t\t\"\"\n\t\t\t\t\t\t\"priority\"\t\t\"250\"\n\t\t\t\t\t}\n";
        let expected = before.replacen(close, &format!("{entry}{close}"), 1);
        assert_eq!(String::from_utf8(after).unwrap(), expected);
    }

    #[test]
    fn config_fixture_replaces_existing_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.vdf");
        fs::write(&path, load_fixture("config.vdf")).unwrap();

        let mapper = TextSpliceMapper::new(&path);
        assert_eq!(
            mapper.compat_tool_for(3_171_212_345).unwrap().as_deref(),
            Some("GE-Proton9-20")
        );
        mapper.set_compat_tool(3_171_212_345, "proton_9").unwrap();
        assert_eq!(
            mapper.compat_tool_for(3_171_212_345).unwrap().as_deref(),
            Some("proton_9")
        );

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("\"3171212345\"").count(), 1);
        assert!(text.contains("\"SDL_GamepadBind\""));
        assert!(text.contains("\"priority\"\t\t\"75\""));
    }

    #[test]
    fn setup_against_fixture_installation() {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Steam");
        let sdcard = tmp.path().join("sdcard");
        install(&root, &sdcard);

        let paths = Paths::with_base(&root);
        let user = resolve_active_user_in(&paths).unwrap();
        assert_eq!(user.steamid3, ACTIVE_STEAMID3);

        let mapper = TextSpliceMapper::for_paths(&paths);
        let mut setup = SteamSetup::new(paths.clone(), ShortcutStore::for_user(&user), mapper);

        let request = ShortcutRequest::new("Fallout Modlist", "/home/deck/Modlists/FO4/ModOrganizer.exe");
        let outcome = setup.create_shortcut_with_proton(&request);
        let (app_id, signed_app_id, prefix_path) = match outcome {
            SetupOutcome::Success {
                app_id,
                signed_app_id,
                prefix_path,
            } => (app_id, signed_app_id, prefix_path),
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(app_id, signed_app_id as u32);
        assert!((-999_999_999..=-100_000_000).contains(&signed_app_id));
        assert_eq!(prefix_path, None);

        let store = setup.store();
        assert_eq!(store.shortcuts().unwrap().len(), 3);
        assert_eq!(
            store.find_app_id("Fallout Modlist", None).unwrap(),
            Some(signed_app_id)
        );
        assert_eq!(
            TextSpliceMapper::for_paths(&paths)
                .compat_tool_for(app_id)
                .unwrap()
                .as_deref(),
            Some("proton_experimental")
        );

        // First launch creates the prefix on the SD card library.
        let compatdata = sdcard.join(format!("steamapps/compatdata/{app_id}"));
        fs::create_dir_all(compatdata.join("pfx")).unwrap();
        assert_eq!(setup.find_compatdata(app_id), Some(compatdata));

        let again = setup.create_shortcut_with_proton(&request);
        assert!(matches!(again, SetupOutcome::Conflict { ref existing } if existing.len() == 1));
    }
}
