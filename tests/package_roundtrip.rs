//! End-to-end lifecycle tests: build packages in memory, persist them to
//! disk, reopen and verify that every operation survives a reparse.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stfs::{package_flags, Sex, StfsError, StfsPackage};
use tempfile::tempdir;

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}

#[test]
fn lifecycle_survives_save_and_reopen() {
    let mut rng = StdRng::seed_from_u64(0x5746_5320);
    let dir = tempdir().unwrap();
    let path = dir.path().join("savegame.con");

    let mut package = StfsPackage::create(0).unwrap();
    package.create_folder("Saves").unwrap();

    let slot0 = random_bytes(&mut rng, 0x2345);
    let slot1 = random_bytes(&mut rng, 0x1000);
    let settings = random_bytes(&mut rng, 0x9D);
    package.inject_file(&slot0, "Saves\\slot0.sav", None).unwrap();
    package.inject_file(&slot1, "Saves\\slot1.sav", None).unwrap();
    package.inject_file(&settings, "settings.bin", None).unwrap();
    package.rehash().unwrap();
    package.save_to(&path).unwrap();

    let mut reopened = StfsPackage::open(&path, 0).unwrap();
    assert_eq!(
        reopened.extract_file("Saves\\slot0.sav", None).unwrap(),
        slot0
    );
    assert_eq!(
        reopened.extract_file("Saves\\slot1.sav", None).unwrap(),
        slot1
    );
    assert_eq!(reopened.extract_file("settings.bin", None).unwrap(), settings);

    // mutate the reopened package and persist again
    reopened.delete_file("Saves\\slot1.sav").unwrap();
    reopened.rename_file("options.bin", "settings.bin").unwrap();
    let slot0_v2 = random_bytes(&mut rng, 0x3000);
    reopened
        .replace_file(&slot0_v2, "Saves\\slot0.sav", None)
        .unwrap();
    reopened.rehash().unwrap();
    reopened.save_to(&path).unwrap();

    let mut last = StfsPackage::open(&path, 0).unwrap();
    assert!(!last.file_exists("Saves\\slot1.sav"));
    assert!(!last.file_exists("settings.bin"));
    assert_eq!(last.extract_file("options.bin", None).unwrap(), settings);
    assert_eq!(
        last.extract_file("Saves\\slot0.sav", None).unwrap(),
        slot0_v2
    );
}

#[test]
fn large_file_promotes_hash_tree() {
    let mut rng = StdRng::seed_from_u64(42);
    // 0xAC blocks: pushes the allocation count past the 0xAA single-table
    // limit and forces a level-1 top table
    let data = random_bytes(&mut rng, 0xAC * 0x1000 + 0x321);

    let mut package = StfsPackage::create(0).unwrap();
    package.inject_file(&data, "world.map", None).unwrap();
    assert!(package.volume_descriptor().allocated_block_count > 0xAA);
    assert_eq!(package.extract_file("world.map", None).unwrap(), data);

    package.rehash().unwrap();
    let mut reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
    assert_eq!(reopened.extract_file("world.map", None).unwrap(), data);

    // a later small file still round-trips under the promoted tree
    let extra = random_bytes(&mut rng, 0x777);
    reopened.inject_file(&extra, "extra.bin", None).unwrap();
    reopened.rehash().unwrap();
    let mut last = StfsPackage::from_bytes(reopened.into_bytes(), 0).unwrap();
    assert_eq!(last.extract_file("extra.bin", None).unwrap(), extra);
    assert_eq!(last.extract_file("world.map", None).unwrap(), data);
}

#[test]
fn replaced_files_follow_the_block_chain() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut package = StfsPackage::create(0).unwrap();

    let a = random_bytes(&mut rng, 0x1800);
    let b = random_bytes(&mut rng, 0x1200);
    package.inject_file(&a, "a.bin", None).unwrap();
    package.inject_file(&b, "b.bin", None).unwrap();

    // growing a.bin fragments it around b.bin's blocks
    let a_v2 = random_bytes(&mut rng, 0x4100);
    let entry = package.replace_file(&a_v2, "a.bin", None).unwrap();
    assert!(!entry.has_consecutive_blocks());
    assert_eq!(package.extract_file("a.bin", None).unwrap(), a_v2);
    assert_eq!(package.extract_file("b.bin", None).unwrap(), b);

    package.rehash().unwrap();
    let mut reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
    assert_eq!(reopened.extract_file("a.bin", None).unwrap(), a_v2);
    assert_eq!(reopened.extract_file("b.bin", None).unwrap(), b);
}

#[test]
fn many_entries_chain_extra_file_table_blocks() {
    let mut package = StfsPackage::create(0).unwrap();
    // more records than fit in one 0x40-entry table block
    for i in 0..0x48 {
        let name = format!("f{i:03}.bin");
        package.inject_file(&[i as u8; 0x20], &name, None).unwrap();
    }
    assert!(package.volume_descriptor().file_table_block_count >= 2);

    package.rehash().unwrap();
    let mut reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
    for i in 0..0x48 {
        let name = format!("f{i:03}.bin");
        assert_eq!(
            reopened.extract_file(&name, None).unwrap(),
            vec![i as u8; 0x20]
        );
    }
}

#[test]
fn female_package_round_trips_on_disk() {
    let mut rng = StdRng::seed_from_u64(99);
    let dir = tempdir().unwrap();
    let path = dir.path().join("female.con");

    let mut package = StfsPackage::create(package_flags::FEMALE).unwrap();
    assert_eq!(package.sex(), Sex::Female);
    let data = random_bytes(&mut rng, 0x5012);
    package.inject_file(&data, "single.copy", None).unwrap();
    package.rehash().unwrap();
    package.save_to(&path).unwrap();

    let mut reopened = StfsPackage::open(&path, 0).unwrap();
    assert_eq!(reopened.sex(), Sex::Female);
    assert_eq!(reopened.extract_file("single.copy", None).unwrap(), data);
}

#[test]
fn pec_package_round_trips_on_disk() {
    let mut rng = StdRng::seed_from_u64(0xEC);
    let dir = tempdir().unwrap();
    let path = dir.path().join("pec.bin");

    let mut package = StfsPackage::create(package_flags::PEC).unwrap();
    let account = random_bytes(&mut rng, 0x3E8);
    package.inject_file(&account, "Account", None).unwrap();
    package.rehash().unwrap();
    package.save_to(&path).unwrap();

    let mut reopened = StfsPackage::open(&path, package_flags::PEC).unwrap();
    assert!(reopened.is_pec());
    assert_eq!(reopened.extract_file("Account", None).unwrap(), account);
}

#[test]
fn rehash_is_stable_across_reopen() {
    let mut package = StfsPackage::create(0).unwrap();
    package.inject_file(&[0x42; 0x2100], "a.bin", None).unwrap();
    package.rehash().unwrap();
    let header_hash = package.metadata.header_hash;
    let top_hash = package.volume_descriptor().top_hash_table_hash;

    let mut reopened = StfsPackage::from_bytes(package.into_bytes(), 0).unwrap();
    reopened.rehash().unwrap();
    assert_eq!(reopened.metadata.header_hash, header_hash);
    assert_eq!(reopened.volume_descriptor().top_hash_table_hash, top_hash);
}

#[test]
fn open_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.con");
    assert!(matches!(
        StfsPackage::open(&missing, 0),
        Err(StfsError::Io(_))
    ));
}

#[test]
fn deleted_name_can_be_reinjected() {
    let mut package = StfsPackage::create(0).unwrap();
    package.inject_file(&[1, 2, 3], "a.bin", None).unwrap();
    package.delete_file("a.bin").unwrap();
    package.inject_file(&[4, 5, 6, 7], "a.bin", None).unwrap();
    assert_eq!(
        package.extract_file("a.bin", None).unwrap(),
        vec![4, 5, 6, 7]
    );
}
