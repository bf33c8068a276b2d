/// Assert that at most one participant believes it holds `object`, and that
/// it is the holder the host has on record
#[macro_export]
macro_rules! assert_single_authority {
    ($session:expr, $object:expr) => {
        let holders = $session.authority_holders($object);
        assert!(
            holders.len() <= 1,
            "Object {} has several local authorities: {:?}",
            $object,
            holders
        );
        if let Some(holder) = holders.first() {
            assert_eq!(
                $session.host().holder($object),
                Some(*holder),
                "Participant {} holds {} but the host disagrees",
                holder,
                $object
            );
        }
    };
}

/// Assert that every copy in `copies` reads the same value through `$read`
#[macro_export]
macro_rules! assert_converged {
    ($copies:expr, $read:expr) => {
        let read = $read;
        let values: Vec<_> = $copies.iter().map(|copy| read(copy)).collect();
        assert!(
            values.windows(2).all(|pair| pair[0] == pair[1]),
            "Copies diverged: {:?}",
            values
        );
    };
}
