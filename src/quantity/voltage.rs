quantity!(Millivolts, suffix: "mV");
