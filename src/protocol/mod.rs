// Протокольный слой: versioned wire format для внешнего транспорта

pub mod wire;
