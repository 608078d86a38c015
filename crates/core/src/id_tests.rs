// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ids_display_as_bare_numbers() {
    assert_eq!(GroupId(3).to_string(), "3");
    assert_eq!(TaskId(17).to_string(), "17");
    assert_eq!(EntryId(1).to_string(), "1");
}

#[test]
fn ids_order_by_value() {
    let mut ids = vec![TaskId(3), TaskId(1), TaskId(2)];
    ids.sort();
    assert_eq!(ids, vec![TaskId(1), TaskId(2), TaskId(3)]);
}

#[test]
fn ids_serialize_transparently() {
    assert_eq!(serde_json::to_string(&GroupId(9)).unwrap(), "9");
}
