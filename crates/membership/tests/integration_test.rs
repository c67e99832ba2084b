use assert_matches::assert_matches;
use foehn_membership::{Error, Membership};
use foehn_membership_mock::MockMembership;

#[test]
fn test_resolve_from_provider() {
    let membership = Membership::resolve(&MockMembership::new(3, 4)).unwrap();

    assert_eq!(membership.rank(), 3);
    assert_eq!(membership.world_size(), 4);
}

#[test]
fn test_resolve_unavailable() {
    assert_matches!(
        Membership::resolve(&MockMembership::unavailable()),
        Err(Error::MembershipUnavailable(_))
    );
}

#[test]
fn test_resolve_rejects_inconsistent_answers() {
    assert_matches!(
        Membership::resolve(&MockMembership::new(4, 4)),
        Err(Error::InvalidMembership(_))
    );
}
