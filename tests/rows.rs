use std::fs;

use sdspi_store::{rewrite, Error, RowStore, Volume};

fn scratch() -> (tempfile::TempDir, Volume) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let volume = Volume::new(dir.path());
    (dir, volume)
}

fn contents(volume: &Volume, path: &str) -> String {
    String::from_utf8(volume.read_file(path).unwrap()).unwrap()
}

fn daily(rows: &RowStore<'_>, path: &str) {
    rows.append_row(path, &["2024-01-01", "10"]).unwrap();
    rows.append_row(path, &["2024-01-02", "20"]).unwrap();
    rows.append_row(path, &["2024-01-03", "30"]).unwrap();
}

#[test]
fn daily_log() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    daily(&rows, "/d.csv");

    assert_eq!(rows.row_count("/d.csv").unwrap(), 3);
    assert_eq!(
        rows.read_column_range("/d.csv", 1, 1, 2),
        vec!["20".to_string(), "30".to_string()]
    );

    rows.keep_last_n("/d.csv", 1).unwrap();
    assert_eq!(contents(&volume, "/d.csv"), "2024-01-03,30\n");

    rows.replace_cell("/d.csv", 0, 1, "99").unwrap();
    assert_eq!(contents(&volume, "/d.csv"), "2024-01-03,99\n");
    assert_eq!(rows.latest_number("/d.csv", 1), Some(99.0));
}

#[test]
fn keep_last_n_twice_changes_nothing() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    daily(&rows, "/d.csv");

    rows.keep_last_n("/d.csv", 2).unwrap();
    let once = contents(&volume, "/d.csv");
    rows.keep_last_n("/d.csv", 2).unwrap();
    assert_eq!(contents(&volume, "/d.csv"), once);
    assert_eq!(once, "2024-01-02,20\n2024-01-03,30\n");
}

#[test]
fn keep_last_n_leaves_short_files_alone() {
    let (_dir, volume) = scratch();
    // Blank lines would be dropped by a rewrite.
    volume.write_file("/d.csv", b"a,1\n\nb,2\r\n").unwrap();
    let rows = RowStore::new(Some(&volume));

    rows.keep_last_n("/d.csv", 2).unwrap();
    rows.keep_last_n("/d.csv", 10).unwrap();
    assert_eq!(contents(&volume, "/d.csv"), "a,1\n\nb,2\r\n");
}

#[test]
fn delete_rows_counts() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    for i in 0..10 {
        rows.append_row("/n.csv", &[i.to_string()]).unwrap();
    }

    rows.delete_rows("/n.csv", 2, 4).unwrap();
    assert_eq!(rows.row_count("/n.csv").unwrap(), 7);
    assert_eq!(
        rows.read_column_range("/n.csv", 0, 0, 3),
        vec!["0", "1", "5", "6"]
    );

    // The end may run past the last row.
    rows.delete_rows("/n.csv", 5, 100).unwrap();
    assert_eq!(rows.row_count("/n.csv").unwrap(), 5);

    rows.delete_rows("/n.csv", 3, 1).unwrap();
    assert_eq!(rows.row_count("/n.csv").unwrap(), 5);
}

#[test]
fn reversed_ranges_read_nothing() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    daily(&rows, "/d.csv");
    assert!(rows.read_column_range("/d.csv", 0, 2, 1).is_empty());
    assert!(rows.read_column_range("/d.csv", 5, 0, 2).is_empty());
    assert!(rows.read_column_range("/absent.csv", 0, 0, 2).is_empty());
}

#[test]
fn filtered_column() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    daily(&rows, "/d.csv");

    let big = rows.read_column_where("/d.csv", 0, 0, 10, |fields| {
        fields[1].parse::<u32>().map(|v| v >= 20).unwrap_or(false)
    });
    assert_eq!(big, vec!["2024-01-02", "2024-01-03"]);
}

#[test]
fn quoted_fields_survive_rewrites() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    rows.append_row("/q.csv", &["plain", "a,b"]).unwrap();
    rows.append_row("/q.csv", &["say \"hi\"", ""]).unwrap();

    rows.replace_cell("/q.csv", 0, 3, "x").unwrap();
    assert_eq!(
        contents(&volume, "/q.csv"),
        "plain,\"a,b\",,x\n\"say \"\"hi\"\"\",\n"
    );
    assert_eq!(rows.read_row("/q.csv", 1).unwrap(), vec!["say \"hi\"", ""]);
    assert_eq!(rows.read_row("/q.csv", 0).unwrap(), vec!["plain", "a,b", "", "x"]);
}

#[test]
fn replace_past_the_end() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    daily(&rows, "/d.csv");
    assert!(matches!(
        rows.replace_cell("/d.csv", 3, 0, "x"),
        Err(Error::NotFound(_))
    ));
    assert_eq!(rows.row_count("/d.csv").unwrap(), 3);
}

#[test]
fn headers_are_written_once() {
    let (_dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    assert!(rows.write_header("/h.csv", &["time", "value"]).unwrap());
    assert!(!rows.write_header("/h.csv", &["other"]).unwrap());
    rows.append_row("/h.csv", &["1", "2"]).unwrap();
    assert_eq!(contents(&volume, "/h.csv"), "time,value\n1,2\n");
}

#[test]
fn interrupted_rewrite_is_recovered() {
    let (dir, volume) = scratch();
    let rows = RowStore::new(Some(&volume));
    let path = dir.path().join("d.csv");

    // Power lost after the delete, before the rename.
    fs::write(rewrite::tmp_path(&path), "2024-01-03,30\n").unwrap();
    assert_eq!(rows.row_count("/d.csv").unwrap(), 1);
    assert!(path.exists());
    assert!(!rewrite::tmp_path(&path).exists());

    // Power lost while the copy was being written.
    fs::write(rewrite::tmp_path(&path), "half").unwrap();
    rows.append_row("/d.csv", &["2024-01-04", "40"]).unwrap();
    assert!(!rewrite::tmp_path(&path).exists());
    assert_eq!(contents(&volume, "/d.csv"), "2024-01-03,30\n2024-01-04,40\n");
}

#[test]
fn unmounted_store_refuses_everything() {
    let rows = RowStore::new(None);
    assert!(!rows.is_mounted());
    assert!(matches!(rows.append_row("/d.csv", &["1"]), Err(Error::Unmounted)));
    assert!(matches!(rows.row_count("/d.csv"), Err(Error::Unmounted)));
    assert!(matches!(rows.delete_rows("/d.csv", 3, 1), Err(Error::Unmounted)));
    assert!(matches!(rows.keep_last_n("/d.csv", 1), Err(Error::Unmounted)));
    assert!(rows.read_column_range("/d.csv", 0, 0, 1).is_empty());
    assert_eq!(rows.latest_number("/d.csv", 0), None);
}

#[test]
fn rows_with_undecodable_bytes() {
    let (_dir, volume) = scratch();
    volume.write_file("/b.csv", b"a,1\nb,\xff\xfe\nc,3\n").unwrap();
    let rows = RowStore::new(Some(&volume));

    assert_eq!(rows.row_count("/b.csv").unwrap(), 3);
    assert_eq!(rows.read_column_range("/b.csv", 0, 0, 2), vec!["a", "b", "c"]);
    assert_eq!(rows.read_row("/b.csv", 1).unwrap(), vec!["b", "\u{fffd}\u{fffd}"]);

    rows.replace_cell("/b.csv", 0, 1, "9").unwrap();
    assert_eq!(volume.read_file("/b.csv").unwrap(), b"a,9\nb,\xff\xfe\nc,3\n");

    rows.delete_rows("/b.csv", 0, 0).unwrap();
    assert_eq!(volume.read_file("/b.csv").unwrap(), b"b,\xff\xfe\nc,3\n");

    rows.keep_last_n("/b.csv", 1).unwrap();
    assert_eq!(contents(&volume, "/b.csv"), "c,3\n");
}

#[test]
fn deleting_the_unterminated_tail() {
    let (_dir, volume) = scratch();
    volume.write_file("/u.csv", b"a,1\nb,2").unwrap();
    let rows = RowStore::new(Some(&volume));

    rows.delete_rows("/u.csv", 1, 1).unwrap();
    assert_eq!(contents(&volume, "/u.csv"), "a,1");

    rows.append_row("/u.csv", &["c", "3"]).unwrap();
    assert_eq!(contents(&volume, "/u.csv"), "a,1\nc,3\n");
}
